//! Process-local label and property-type registries (§4.11).
//!
//! Registries are populated once, collectively, at database init and are
//! read-only afterward (§5: "Label/ptype registries: read-only after DB
//! init"). Every peer is expected to register the same names in the same
//! order; this crate does not itself enforce that — it is a precondition
//! on the caller, exactly as spec.md states.

use ahash::AHashMap;

use crate::error::ErrorKind;
use crate::property::{Entity, FIRST_USER_HANDLE};

/// Sentinel label handle meaning "no label", used when indexing a
/// created vertex that carries no labels (§4.10 commit step 3).
pub const LABEL_NONE: u8 = 0;

/// Whether a property type's values are a fixed byte count or bounded by
/// a maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeKind {
    /// Every value must be exactly `count` bytes (or `count` elements of
    /// the underlying datatype; this crate tracks bytes directly).
    Fixed,
    /// Every value must be at most `count` bytes.
    Max,
}

/// A registered property type.
#[derive(Debug, Clone)]
pub struct PropertyTypeDescriptor {
    /// The type's name.
    pub name: String,
    /// The storage handle used as the property-record tag
    /// (`>= FIRST_USER_HANDLE`).
    pub handle: u8,
    /// Single- or multi-valued per vertex/edge.
    pub entity: Entity,
    /// Fixed- or max-size value constraint.
    pub size_kind: SizeKind,
    /// The fixed or maximum byte count, depending on `size_kind`.
    pub count: u32,
}

/// A registered label.
#[derive(Debug, Clone)]
pub struct LabelDescriptor {
    /// The label's name.
    pub name: String,
    /// The label's storage handle (never `LABEL_NONE`).
    pub handle: u8,
}

/// A reference to a property type as understood by the public API,
/// distinguishing the three read-only computed degree properties (which
/// never touch the property list; see `holder::VertexHolder::degree`)
/// from ordinary stored property types and the built-in ID slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyTypeRef {
    /// The vertex/edge external ID (storage handle [`crate::property::ID`]).
    Id,
    /// A user-registered property type.
    User(u8),
    /// Read-only: total edge count.
    Degree,
    /// Read-only: incoming edge count.
    InDegree,
    /// Read-only: outgoing edge count.
    OutDegree,
}

/// Process-local label/property-type name/handle tables.
#[derive(Debug, Default)]
pub struct Registry {
    labels_by_name: AHashMap<String, u8>,
    labels_by_handle: AHashMap<u8, LabelDescriptor>,
    next_label_handle: u16,

    property_types_by_name: AHashMap<String, u8>,
    property_types_by_handle: AHashMap<u8, PropertyTypeDescriptor>,
    next_property_type_handle: u16,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Registry {
        Registry {
            next_label_handle: LABEL_NONE as u16 + 1,
            next_property_type_handle: FIRST_USER_HANDLE as u16,
            ..Default::default()
        }
    }

    /// Registers a new label, returning its handle.
    pub fn create_label(&mut self, name: impl Into<String>) -> Result<u8, ErrorKind> {
        let name = name.into();
        if self.labels_by_name.contains_key(&name) {
            return Err(ErrorKind::Label);
        }
        if self.next_label_handle > u8::MAX as u16 {
            return Err(ErrorKind::SizeLimit);
        }
        let handle = self.next_label_handle as u8;
        self.next_label_handle += 1;
        self.labels_by_name.insert(name.clone(), handle);
        self.labels_by_handle.insert(handle, LabelDescriptor { name, handle });
        Ok(handle)
    }

    /// Looks up a label's handle by name.
    pub fn label_by_name(&self, name: &str) -> Result<u8, ErrorKind> {
        self.labels_by_name.get(name).copied().ok_or(ErrorKind::Label)
    }

    /// Looks up a label's descriptor by handle.
    pub fn label_by_handle(&self, handle: u8) -> Result<&LabelDescriptor, ErrorKind> {
        self.labels_by_handle.get(&handle).ok_or(ErrorKind::Label)
    }

    /// Whether `handle` names a registered label (or [`LABEL_NONE`]).
    pub fn label_exists(&self, handle: u8) -> bool {
        handle == LABEL_NONE || self.labels_by_handle.contains_key(&handle)
    }

    /// Registers a new property type, returning its storage handle.
    pub fn create_property_type(
        &mut self,
        name: impl Into<String>,
        entity: Entity,
        size_kind: SizeKind,
        count: u32,
    ) -> Result<u8, ErrorKind> {
        let name = name.into();
        if self.property_types_by_name.contains_key(&name) {
            return Err(ErrorKind::PropertyType);
        }
        if self.next_property_type_handle > u8::MAX as u16 {
            return Err(ErrorKind::SizeLimit);
        }
        let handle = self.next_property_type_handle as u8;
        self.next_property_type_handle += 1;
        self.property_types_by_name.insert(name.clone(), handle);
        self.property_types_by_handle.insert(
            handle,
            PropertyTypeDescriptor { name, handle, entity, size_kind, count },
        );
        Ok(handle)
    }

    /// Looks up a property type's descriptor by name.
    pub fn property_type_by_name(&self, name: &str) -> Result<&PropertyTypeDescriptor, ErrorKind> {
        let handle = self.property_types_by_name.get(name).copied().ok_or(ErrorKind::PropertyType)?;
        self.property_type_by_handle(handle)
    }

    /// Looks up a property type's descriptor by storage handle.
    pub fn property_type_by_handle(&self, handle: u8) -> Result<&PropertyTypeDescriptor, ErrorKind> {
        self.property_types_by_handle.get(&handle).ok_or(ErrorKind::PropertyType)
    }

    /// Validates a value's byte count against `ptype`'s size constraint.
    pub fn validate_size(&self, ptype: &PropertyTypeDescriptor, count: usize) -> Result<(), ErrorKind> {
        match ptype.size_kind {
            SizeKind::Fixed if count != ptype.count as usize => Err(ErrorKind::SizeLimit),
            SizeKind::Max if count > ptype.count as usize => Err(ErrorKind::SizeLimit),
            _ => Ok(()),
        }
    }
}
