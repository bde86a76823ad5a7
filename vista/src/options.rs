use serde::Deserialize;

/// Number of items a culling task takes before the thread pool clamps it.
pub const DEFAULT_CULLING_SPLIT_COUNT: usize = 256;

/// Upper bound of a material buffer pool.
pub const DEFAULT_MAXIMUM_POOL_BYTES: u64 = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CullingOptions {
    /// Worker count, one per hardware thread when `None`.
    pub thread_count: Option<usize>,
    /// Items per culling task. Rounded up to whole SIMD lanes.
    pub split_count: usize,
}

impl Default for CullingOptions {
    fn default() -> Self {
        Self {
            thread_count: None,
            split_count: DEFAULT_CULLING_SPLIT_COUNT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MaterialBufferOptions {
    /// Pools are the smaller of this and the device's uniform buffer limit.
    pub maximum_pool_bytes: u64,
    /// Binding slot the pool resource groups are bound to.
    pub root_parameter_index: u32,
    pub label: String,
}

impl Default for MaterialBufferOptions {
    fn default() -> Self {
        Self {
            maximum_pool_bytes: DEFAULT_MAXIMUM_POOL_BYTES,
            root_parameter_index: 0,
            label: String::from("material buffer pool"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{CullingOptions, MaterialBufferOptions, DEFAULT_CULLING_SPLIT_COUNT};

    #[test]
    fn partial_options_use_defaults() {
        let culling: CullingOptions = serde_json::from_str(r#"{ "thread_count": 3 }"#).unwrap();
        assert_eq!(
            culling,
            CullingOptions {
                thread_count: Some(3),
                split_count: DEFAULT_CULLING_SPLIT_COUNT,
            }
        );

        let material: MaterialBufferOptions = serde_json::from_str(r#"{ "root_parameter_index": 2 }"#).unwrap();
        assert_eq!(material.root_parameter_index, 2);
        assert_eq!(material.maximum_pool_bytes, 64 * 1024);
    }
}
