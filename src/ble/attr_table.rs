//! Flattened GATT attribute table and handle arithmetic.
//!
//! The stack assigns handles in submission order and reports them back as a
//! plain array, so positions in that array are the only link between a
//! handle and the profile entity it belongs to.  Within a service the
//! entries are always laid out as:
//!
//! ```text
//!   [service decl] ([char decl] [value] [descriptor]?)*
//! ```
//!
//! A service therefore consumes `1 + Σ (2 | 3)` handles.  [`HandleLayout`]
//! records the cumulative offsets and maps array indices back to
//! (service, characteristic, role) with arithmetic alone.

use super::profile::{
    CHARACTERISTIC_DECLARATION, PRIMARY_SERVICE, Permissions, Profile, Properties,
};
use super::uuid::BleUuid;

const SECONDARY_SERVICE: BleUuid = BleUuid::from_u16(0x2801);

// ───────────────────────────────────────────────────────────────
// Entries
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeTableEntry {
    pub uuid: BleUuid,
    pub permissions: Permissions,
    /// Stack answers reads and writes itself.
    pub auto_response: bool,
    pub max_length: u16,
    /// Initial value; its length is the attribute's current length.
    pub value: Vec<u8>,
}

impl AttributeTableEntry {
    fn readonly(uuid: BleUuid, value: Vec<u8>) -> Self {
        Self {
            uuid,
            permissions: Permissions::READ,
            auto_response: true,
            max_length: value.len() as u16,
            value,
        }
    }
}

/// Attribute entries for a whole profile plus the per-service handle counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeTable {
    entries: Vec<AttributeTableEntry>,
    layout: HandleLayout,
}

impl AttributeTable {
    pub fn build(profile: &Profile) -> Self {
        let mut entries = Vec::new();
        let mut services = Vec::with_capacity(profile.services.len());

        for service in &profile.services {
            let offset = entries.len();
            let decl_uuid = if service.primary { PRIMARY_SERVICE } else { SECONDARY_SERVICE };
            entries.push(AttributeTableEntry::readonly(decl_uuid, service.uuid.as_bytes().to_vec()));

            let mut characteristics = Vec::with_capacity(service.characteristics.len());
            for c in &service.characteristics {
                entries.push(AttributeTableEntry::readonly(
                    CHARACTERISTIC_DECLARATION,
                    vec![c.properties.bits()],
                ));
                entries.push(AttributeTableEntry {
                    uuid: c.uuid,
                    permissions: c.permissions,
                    auto_response: !c.dynamic_read,
                    max_length: c.max_length,
                    value: vec![0; usize::from(c.data_length)],
                });
                if let Some(d) = &c.descriptor {
                    entries.push(AttributeTableEntry {
                        uuid: d.uuid,
                        permissions: d.permissions,
                        auto_response: true,
                        max_length: d.max_length,
                        value: d.initial_value.to_vec(),
                    });
                }
                characteristics.push(CharacteristicSpan {
                    uuid: c.uuid,
                    has_descriptor: c.descriptor.is_some(),
                    notifiable: c.properties.contains(Properties::NOTIFY),
                    dynamic_read: c.dynamic_read,
                });
            }

            services.push(ServiceSpan {
                uuid: service.uuid,
                offset,
                handle_count: entries.len() - offset,
                characteristics,
            });
        }

        Self { layout: HandleLayout { services, total: entries.len() }, entries }
    }

    pub fn entries(&self) -> &[AttributeTableEntry] {
        &self.entries
    }

    /// Entries of one service, as submitted to the stack.
    pub fn service_entries(&self, service: usize) -> Option<&[AttributeTableEntry]> {
        let span = self.layout.services.get(service)?;
        self.entries.get(span.offset..span.offset + span.handle_count)
    }

    pub fn layout(&self) -> &HandleLayout {
        &self.layout
    }

    pub fn into_layout(self) -> HandleLayout {
        self.layout
    }
}

// ───────────────────────────────────────────────────────────────
// Handle arithmetic
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicSpan {
    pub uuid: BleUuid,
    pub has_descriptor: bool,
    pub notifiable: bool,
    pub dynamic_read: bool,
}

impl CharacteristicSpan {
    const fn width(&self) -> usize {
        if self.has_descriptor { 3 } else { 2 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpan {
    pub uuid: BleUuid,
    /// Index of the service declaration in the global handle array.
    pub offset: usize,
    pub handle_count: usize,
    pub characteristics: Vec<CharacteristicSpan>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeRole {
    ServiceDeclaration,
    CharacteristicDeclaration,
    Value,
    Descriptor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeLocation {
    pub service: usize,
    /// `None` for the service declaration.
    pub characteristic: Option<usize>,
    pub role: AttributeRole,
}

/// Positions of a characteristic's value and descriptor in the handle array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicIndices {
    pub value: usize,
    pub descriptor: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HandleLayout {
    services: Vec<ServiceSpan>,
    total: usize,
}

impl HandleLayout {
    pub fn services(&self) -> &[ServiceSpan] {
        &self.services
    }

    /// Handles consumed by the whole profile.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn locate(&self, index: usize) -> Option<AttributeLocation> {
        let (service, span) = self
            .services
            .iter()
            .enumerate()
            .find(|(_, s)| (s.offset..s.offset + s.handle_count).contains(&index))?;

        let mut rel = index - span.offset;
        if rel == 0 {
            return Some(AttributeLocation {
                service,
                characteristic: None,
                role: AttributeRole::ServiceDeclaration,
            });
        }
        rel -= 1;

        for (characteristic, c) in span.characteristics.iter().enumerate() {
            if rel < c.width() {
                let role = match rel {
                    0 => AttributeRole::CharacteristicDeclaration,
                    1 => AttributeRole::Value,
                    _ => AttributeRole::Descriptor,
                };
                return Some(AttributeLocation { service, characteristic: Some(characteristic), role });
            }
            rel -= c.width();
        }
        None
    }

    pub fn find(&self, characteristic: &BleUuid, service: &BleUuid) -> Option<CharacteristicIndices> {
        let span = self.services.iter().find(|s| s.uuid == *service)?;
        let mut index = span.offset + 1;
        for c in &span.characteristics {
            if c.uuid == *characteristic {
                return Some(CharacteristicIndices {
                    value: index + 1,
                    descriptor: c.has_descriptor.then_some(index + 2),
                });
            }
            index += c.width();
        }
        None
    }

    pub fn characteristic(&self, location: &AttributeLocation) -> Option<(&ServiceSpan, &CharacteristicSpan)> {
        let span = self.services.get(location.service)?;
        let c = span.characteristics.get(location.characteristic?)?;
        Some((span, c))
    }
}
