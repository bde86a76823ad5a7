//! Reusable containers and math used by the managers.

pub mod dense_list;
pub mod freelist;
pub mod frustum;
pub mod lanes;
pub mod math;
pub mod typedefs;
