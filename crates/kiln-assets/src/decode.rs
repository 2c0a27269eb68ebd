//! Bounds-checked accessor decoding.
//!
//! Accessors are read-only projections over a raw byte buffer. Every read
//! validates the full byte range an accessor covers once, before touching
//! any element, so a malformed accessor is rejected instead of truncated.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

/// Scalar type of each component of an accessor element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentType {
    I8,
    U8,
    I16,
    U16,
    U32,
    F32,
}

impl ComponentType {
    /// Size of one component in bytes.
    pub fn size(self) -> usize {
        match self {
            ComponentType::I8 | ComponentType::U8 => 1,
            ComponentType::I16 | ComponentType::U16 => 2,
            ComponentType::U32 | ComponentType::F32 => 4,
        }
    }
}

impl From<gltf::accessor::DataType> for ComponentType {
    fn from(data_type: gltf::accessor::DataType) -> Self {
        use gltf::accessor::DataType;
        match data_type {
            DataType::I8 => ComponentType::I8,
            DataType::U8 => ComponentType::U8,
            DataType::I16 => ComponentType::I16,
            DataType::U16 => ComponentType::U16,
            DataType::U32 => ComponentType::U32,
            DataType::F32 => ComponentType::F32,
        }
    }
}

/// Number and arrangement of components in one accessor element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Scalar,
    Vec2,
    Vec3,
    Vec4,
    Mat2,
    Mat3,
    Mat4,
}

impl Shape {
    pub fn components(self) -> usize {
        match self {
            Shape::Scalar => 1,
            Shape::Vec2 => 2,
            Shape::Vec3 => 3,
            Shape::Vec4 | Shape::Mat2 => 4,
            Shape::Mat3 => 9,
            Shape::Mat4 => 16,
        }
    }
}

impl From<gltf::accessor::Dimensions> for Shape {
    fn from(dimensions: gltf::accessor::Dimensions) -> Self {
        use gltf::accessor::Dimensions;
        match dimensions {
            Dimensions::Scalar => Shape::Scalar,
            Dimensions::Vec2 => Shape::Vec2,
            Dimensions::Vec3 => Shape::Vec3,
            Dimensions::Vec4 => Shape::Vec4,
            Dimensions::Mat2 => Shape::Mat2,
            Dimensions::Mat3 => Shape::Mat3,
            Dimensions::Mat4 => Shape::Mat4,
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Shape::Scalar => "SCALAR",
            Shape::Vec2 => "VEC2",
            Shape::Vec3 => "VEC3",
            Shape::Vec4 => "VEC4",
            Shape::Mat2 => "MAT2",
            Shape::Mat3 => "MAT3",
            Shape::Mat4 => "MAT4",
        };
        f.write_str(name)
    }
}

/// A byte range of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferView {
    pub buffer: usize,
    pub offset: usize,
    pub length: usize,
    /// Distance between consecutive elements; `None` or `Some(0)` means tightly packed.
    pub stride: Option<usize>,
}

/// Typed description of `count` elements inside a [`BufferView`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accessor {
    pub component: ComponentType,
    pub shape: Shape,
    pub normalized: bool,
    pub count: usize,
    /// Byte offset relative to the start of the view.
    pub offset: usize,
    pub view: Option<usize>,
}

impl Accessor {
    /// Size of one element in bytes.
    pub fn element_size(&self) -> usize {
        self.component.size() * self.shape.components()
    }
}

/// Errors produced while decoding accessor data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("accessor reads bytes {start}..{end} but only {limit} are available")]
    OutOfBounds {
        start: usize,
        end: usize,
        limit: usize,
    },

    #[error("byte stride {stride} is smaller than the {element_size}-byte element")]
    InvalidStride { stride: usize, element_size: usize },

    #[error("expected {expected} accessor, found {found}")]
    ShapeMismatch { expected: Shape, found: Shape },

    #[error("component type {found:?} cannot be read as {expected}")]
    UnsupportedComponent {
        found: ComponentType,
        expected: &'static str,
    },

    #[error("accessor has no buffer view")]
    MissingView,

    #[error("buffer view references missing buffer {0}")]
    MissingBuffer(usize),
}

/// Validated placement of an accessor's elements inside its buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub start: usize,
    pub stride: usize,
    pub element_size: usize,
    pub count: usize,
}

impl Layout {
    fn element_offset(&self, index: usize) -> usize {
        self.start + index * self.stride
    }
}

/// Validate the byte range of an accessor against its view and buffer.
///
/// `required = stride * (count - 1) + element_size` must fit both inside the
/// view window and inside the buffer, measured from
/// `view.offset + accessor.offset`.
pub fn layout(buffer_len: usize, view: &BufferView, accessor: &Accessor) -> Result<Layout, DecodeError> {
    let element_size = accessor.element_size();
    let stride = match view.stride {
        Some(stride) if stride > 0 => stride,
        _ => element_size,
    };
    if stride < element_size {
        return Err(DecodeError::InvalidStride {
            stride,
            element_size,
        });
    }

    let start = view.offset.saturating_add(accessor.offset);
    if accessor.count == 0 {
        return Ok(Layout {
            start,
            stride,
            element_size,
            count: 0,
        });
    }

    let required = stride
        .saturating_mul(accessor.count - 1)
        .saturating_add(element_size);
    let end = start.saturating_add(required);

    let view_end = view.offset.saturating_add(view.length);
    let limit = view_end.min(buffer_len);
    if end > limit {
        return Err(DecodeError::OutOfBounds { start, end, limit });
    }

    Ok(Layout {
        start,
        stride,
        element_size,
        count: accessor.count,
    })
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    LittleEndian::read_u16(&bytes[at..at + 2])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    LittleEndian::read_u32(&bytes[at..at + 4])
}

fn read_f32(bytes: &[u8], at: usize) -> f32 {
    f32::from_bits(read_u32(bytes, at))
}

/// Read one component as a float. Integer components are only accepted when
/// the accessor is normalized.
fn float_component(bytes: &[u8], at: usize, component: ComponentType) -> f32 {
    match component {
        ComponentType::F32 => read_f32(bytes, at),
        ComponentType::U8 => bytes[at] as f32 / 255.0,
        ComponentType::U16 => read_u16(bytes, at) as f32 / 65535.0,
        ComponentType::I8 => (bytes[at] as i8 as f32 / 127.0).max(-1.0),
        ComponentType::I16 => (read_u16(bytes, at) as i16 as f32 / 32767.0).max(-1.0),
        ComponentType::U32 => read_u32(bytes, at) as f32,
    }
}

fn uint_component(bytes: &[u8], at: usize, component: ComponentType) -> u32 {
    match component {
        ComponentType::U8 => bytes[at] as u32,
        ComponentType::U16 => read_u16(bytes, at) as u32,
        _ => read_u32(bytes, at),
    }
}

fn expect_components<const N: usize>(accessor: &Accessor) -> Result<(), DecodeError> {
    if accessor.shape.components() != N {
        let expected = match N {
            1 => Shape::Scalar,
            2 => Shape::Vec2,
            3 => Shape::Vec3,
            16 => Shape::Mat4,
            _ => Shape::Vec4,
        };
        return Err(DecodeError::ShapeMismatch {
            expected,
            found: accessor.shape,
        });
    }
    Ok(())
}

/// Decode `count` float elements of `N` components each.
///
/// Accepts 32-bit float components, or normalized 8/16-bit integers which
/// are mapped to `[0, 1]` (unsigned) or `[-1, 1]` (signed).
pub fn read_floats<const N: usize>(
    buffer: &[u8],
    view: &BufferView,
    accessor: &Accessor,
) -> Result<Vec<[f32; N]>, DecodeError> {
    expect_components::<N>(accessor)?;
    let component = accessor.component;
    let is_float = component == ComponentType::F32;
    if !is_float && !(accessor.normalized && component != ComponentType::U32) {
        return Err(DecodeError::UnsupportedComponent {
            found: component,
            expected: "float",
        });
    }

    let layout = layout(buffer.len(), view, accessor)?;
    let size = component.size();
    let values = (0..layout.count)
        .map(|i| {
            let base = layout.element_offset(i);
            std::array::from_fn(|c| float_component(buffer, base + c * size, component))
        })
        .collect();
    Ok(values)
}

/// Decode `count` unsigned integer elements of `N` components each,
/// widening 8/16-bit components to `u32`.
pub fn read_uints<const N: usize>(
    buffer: &[u8],
    view: &BufferView,
    accessor: &Accessor,
) -> Result<Vec<[u32; N]>, DecodeError> {
    expect_components::<N>(accessor)?;
    let component = accessor.component;
    if !matches!(
        component,
        ComponentType::U8 | ComponentType::U16 | ComponentType::U32
    ) {
        return Err(DecodeError::UnsupportedComponent {
            found: component,
            expected: "unsigned integer",
        });
    }

    let layout = layout(buffer.len(), view, accessor)?;
    let size = component.size();
    let values = (0..layout.count)
        .map(|i| {
            let base = layout.element_offset(i);
            std::array::from_fn(|c| uint_component(buffer, base + c * size, component))
        })
        .collect();
    Ok(values)
}

/// Decode a scalar float accessor (keyframe timestamps).
pub fn read_scalars(buffer: &[u8], view: &BufferView, accessor: &Accessor) -> Result<Vec<f32>, DecodeError> {
    Ok(read_floats::<1>(buffer, view, accessor)?
        .into_iter()
        .map(|[v]| v)
        .collect())
}

/// Decode an index accessor (8/16/32-bit unsigned) into uniform `u32` indices.
pub fn read_indices(buffer: &[u8], view: &BufferView, accessor: &Accessor) -> Result<Vec<u32>, DecodeError> {
    Ok(read_uints::<1>(buffer, view, accessor)?
        .into_iter()
        .map(|[v]| v)
        .collect())
}

/// Decode a MAT4 accessor into column-major matrices.
pub fn read_matrices(
    buffer: &[u8],
    view: &BufferView,
    accessor: &Accessor,
) -> Result<Vec<[f32; 16]>, DecodeError> {
    read_floats::<16>(buffer, view, accessor)
}
