use glam::{IVec2, IVec3, IVec4, Mat3, Mat4, Vec2, Vec3, Vec4};
use thiserror::Error;

/// Size of one constant buffer package. Values are not allowed to straddle a
/// package boundary.
pub const PACKAGE_SIZE: u32 = 16;

/// Identifier of a material property, the FNV-1a hash of its name.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MaterialPropertyId(pub u32);

impl MaterialPropertyId {
    pub const fn from_name(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash: u32 = 0x811C_9DC5;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u32;
            hash = hash.wrapping_mul(0x0100_0193);
            i += 1;
        }
        Self(hash)
    }
}

/// Type of a value a uniform buffer element holds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    Boolean,
    Integer,
    Integer2,
    Integer3,
    Integer4,
    Float,
    Float2,
    Float3,
    Float4,
    Float3x3,
    Float4x4,
}

impl ValueType {
    /// Number of bytes the value occupies inside of a uniform buffer.
    pub const fn byte_size(self) -> u32 {
        match self {
            Self::Boolean | Self::Integer | Self::Float => 4,
            Self::Integer2 | Self::Float2 => 8,
            Self::Integer3 | Self::Float3 => 12,
            Self::Integer4 | Self::Float4 => 16,
            Self::Float3x3 => 36,
            Self::Float4x4 => 64,
        }
    }
}

/// A concrete material property value.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum MaterialPropertyValue {
    Boolean(bool),
    Integer(i32),
    Integer2(IVec2),
    Integer3(IVec3),
    Integer4(IVec4),
    Float(f32),
    Float2(Vec2),
    Float3(Vec3),
    Float4(Vec4),
    Float3x3(Mat3),
    Float4x4(Mat4),
}

impl MaterialPropertyValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Boolean(_) => ValueType::Boolean,
            Self::Integer(_) => ValueType::Integer,
            Self::Integer2(_) => ValueType::Integer2,
            Self::Integer3(_) => ValueType::Integer3,
            Self::Integer4(_) => ValueType::Integer4,
            Self::Float(_) => ValueType::Float,
            Self::Float2(_) => ValueType::Float2,
            Self::Float3(_) => ValueType::Float3,
            Self::Float4(_) => ValueType::Float4,
            Self::Float3x3(_) => ValueType::Float3x3,
            Self::Float4x4(_) => ValueType::Float4x4,
        }
    }

    /// Writes the gpu representation of the value into the front of `out`.
    ///
    /// Booleans are written as a 32 bit integer.
    pub fn write_bytes(&self, out: &mut [u8]) {
        let boolean;
        let bytes: &[u8] = match self {
            Self::Boolean(v) => {
                boolean = u32::from(*v);
                bytemuck::bytes_of(&boolean)
            }
            Self::Integer(v) => bytemuck::bytes_of(v),
            Self::Integer2(v) => bytemuck::bytes_of(v),
            Self::Integer3(v) => bytemuck::bytes_of(v),
            Self::Integer4(v) => bytemuck::bytes_of(v),
            Self::Float(v) => bytemuck::bytes_of(v),
            Self::Float2(v) => bytemuck::bytes_of(v),
            Self::Float3(v) => bytemuck::bytes_of(v),
            Self::Float4(v) => bytemuck::bytes_of(v),
            Self::Float3x3(v) => bytemuck::bytes_of(v),
            Self::Float4x4(v) => bytemuck::bytes_of(v),
        };
        debug_assert_eq!(bytes.len(), self.value_type().byte_size() as usize);
        out[..bytes.len()].copy_from_slice(bytes);
    }
}

/// A named property of a material, the global property set or a blueprint.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MaterialProperty {
    pub id: MaterialPropertyId,
    pub value: MaterialPropertyValue,
}

impl MaterialProperty {
    pub fn new(name: &str, value: MaterialPropertyValue) -> Self {
        Self {
            id: MaterialPropertyId::from_name(name),
            value,
        }
    }
}

#[derive(Debug, Error)]
pub enum MaterialPropertiesError {
    #[error("Material property {0:?} was declared more than once")]
    DuplicateProperty(MaterialPropertyId),
}

/// Sorted list of material properties with lookup by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialProperties {
    sorted: Vec<MaterialProperty>,
}

impl MaterialProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_properties(mut properties: Vec<MaterialProperty>) -> Result<Self, MaterialPropertiesError> {
        properties.sort_by_key(|p| p.id);
        if let Some(window) = properties.windows(2).find(|w| w[0].id == w[1].id) {
            return Err(MaterialPropertiesError::DuplicateProperty(window[0].id));
        }
        Ok(Self { sorted: properties })
    }

    pub fn property_by_id(&self, id: MaterialPropertyId) -> Option<&MaterialProperty> {
        self.sorted
            .binary_search_by_key(&id, |p| p.id)
            .ok()
            .map(|idx| &self.sorted[idx])
    }

    /// Inserts or overwrites a property. Returns true if the value changed.
    pub fn set_property(&mut self, property: MaterialProperty) -> bool {
        match self.sorted.binary_search_by_key(&property.id, |p| p.id) {
            Ok(idx) => {
                let changed = self.sorted[idx].value != property.value;
                self.sorted[idx] = property;
                changed
            }
            Err(idx) => {
                self.sorted.insert(idx, property);
                true
            }
        }
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &MaterialProperty> {
        self.sorted.iter()
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }
}

/// Where a uniform buffer element gets its bytes from.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ElementSource {
    Static(MaterialPropertyValue),
    MaterialReference(MaterialPropertyId),
    GlobalReference(MaterialPropertyId),
    UnknownReference(MaterialPropertyId),
}

/// One declared element of a blueprint's per-material uniform buffer.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct UniformBufferElement {
    pub value_type: ValueType,
    pub source: ElementSource,
}

impl UniformBufferElement {
    pub fn new(value_type: ValueType, source: ElementSource) -> Self {
        if let ElementSource::Static(value) = source {
            debug_assert_eq!(value.value_type(), value_type);
        }
        Self { value_type, source }
    }

    pub fn byte_size(&self) -> u32 {
        self.value_type.byte_size()
    }

    pub fn reference(&self) -> Option<MaterialPropertyId> {
        match self.source {
            ElementSource::Static(_) => None,
            ElementSource::MaterialReference(id)
            | ElementSource::GlobalReference(id)
            | ElementSource::UnknownReference(id) => Some(id),
        }
    }
}

/// Walks element sizes and yields the byte offset of every element inside of
/// one packed record.
///
/// A value that would cross a package boundary starts at the next boundary.
pub fn packed_element_offsets(sizes: impl IntoIterator<Item = u32>) -> impl Iterator<Item = u32> {
    let mut offset = 0;
    let mut package_bytes = 0;
    sizes.into_iter().map(move |size| {
        if package_bytes != 0 && package_bytes + size > PACKAGE_SIZE {
            offset += PACKAGE_SIZE - package_bytes;
            package_bytes = 0;
        }
        let current = offset;
        offset += size;
        package_bytes = (package_bytes + size) % PACKAGE_SIZE;
        current
    })
}

/// Layout of the per-material uniform buffer of a blueprint.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformBufferLayout {
    pub elements: Vec<UniformBufferElement>,
    /// Array length the shaders declare.
    pub number_of_elements: u32,
    /// Total size of the declared array in bytes.
    pub total_bytes: u32,
}

impl UniformBufferLayout {
    /// Builds a layout whose per-element stride is the packed size of
    /// `elements` rounded up to a whole package.
    pub fn packed(elements: Vec<UniformBufferElement>, number_of_elements: u32) -> Self {
        let end = packed_element_offsets(elements.iter().map(|e| e.byte_size()))
            .zip(elements.iter())
            .map(|(offset, element)| offset + element.byte_size())
            .last()
            .unwrap_or(0);
        let stride = (end + PACKAGE_SIZE - 1) / PACKAGE_SIZE * PACKAGE_SIZE;

        Self {
            elements,
            number_of_elements,
            total_bytes: stride * number_of_elements,
        }
    }

    pub fn bytes_per_element(&self) -> u32 {
        if self.number_of_elements == 0 {
            0
        } else {
            self.total_bytes / self.number_of_elements
        }
    }
}

/// What the material buffer manager needs to know about a blueprint.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialBlueprint {
    /// Default values of the blueprint's properties.
    pub properties: MaterialProperties,
    pub uniform_buffer: UniformBufferLayout,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn property_ids_are_stable() {
        assert_eq!(MaterialPropertyId::from_name(""), MaterialPropertyId(0x811C_9DC5));
        assert_eq!(MaterialPropertyId::from_name("a"), MaterialPropertyId(0xE40C_292C));
        assert_ne!(
            MaterialPropertyId::from_name("AlbedoColor"),
            MaterialPropertyId::from_name("RoughnessFactor")
        );
    }

    #[test]
    fn duplicate_properties_rejected() {
        let props = vec![
            MaterialProperty::new("Alpha", MaterialPropertyValue::Float(1.0)),
            MaterialProperty::new("Alpha", MaterialPropertyValue::Float(0.5)),
        ];
        assert!(matches!(
            MaterialProperties::from_properties(props),
            Err(MaterialPropertiesError::DuplicateProperty(_))
        ));
    }

    #[test]
    fn set_property_reports_changes() {
        let mut props = MaterialProperties::new();
        let alpha = MaterialProperty::new("Alpha", MaterialPropertyValue::Float(1.0));
        assert!(props.set_property(alpha));
        assert!(!props.set_property(alpha));
        assert!(props.set_property(MaterialProperty::new("Alpha", MaterialPropertyValue::Float(0.25))));
        assert_eq!(
            props.property_by_id(alpha.id).map(|p| p.value),
            Some(MaterialPropertyValue::Float(0.25))
        );
    }

    #[test]
    fn packing_offsets() {
        // float, float3, float2, float3, float, float4x4, float4
        let sizes = [4, 12, 8, 12, 4, 64, 16];
        let offsets: Vec<u32> = packed_element_offsets(sizes).collect();
        assert_eq!(offsets, [0, 4, 16, 32, 44, 48, 112]);
    }

    #[test]
    fn packing_skips_partial_package() {
        // float2 then float4 has to skip 8 bytes
        let offsets: Vec<u32> = packed_element_offsets([8, 16, 4]).collect();
        assert_eq!(offsets, [0, 16, 32]);
    }

    #[test]
    fn packed_layout_stride() {
        let layout = UniformBufferLayout::packed(
            vec![
                UniformBufferElement::new(ValueType::Float4, ElementSource::Static(MaterialPropertyValue::Float4(Vec4::ONE))),
                UniformBufferElement::new(ValueType::Float, ElementSource::Static(MaterialPropertyValue::Float(0.0))),
            ],
            8,
        );
        assert_eq!(layout.bytes_per_element(), 32);
        assert_eq!(layout.total_bytes, 256);
    }

    #[test]
    fn boolean_written_as_word() {
        let mut out = [0xFF_u8; 8];
        MaterialPropertyValue::Boolean(true).write_bytes(&mut out);
        assert_eq!(out, [1, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF]);
    }
}
