//! Routing of stack callbacks to registered handlers.
//!
//! Bluedroid callbacks are plain C function pointers with no user-data
//! argument.  The only identity they carry is the interface id the stack
//! assigned at registration, and the registration event carries the app id
//! the firmware chose.  [`HandlerTable`] maps both to a slot:
//!
//! ```text
//!   register(h)        ─▶ app_id = slot index
//!   REG_EVT(app_id)    ─▶ bind_interface(app_id, gatts_if)
//!   any GATTS(if)      ─▶ resolve(if) ─▶ handler
//!   any GAP            ─▶ every handler
//! ```

struct Slot<H> {
    handler: H,
    gatts_if: Option<u8>,
}

pub struct HandlerTable<H, const N: usize> {
    slots: [Option<Slot<H>>; N],
}

impl<H, const N: usize> Default for HandlerTable<H, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H, const N: usize> HandlerTable<H, N> {
    pub const fn new() -> Self {
        Self { slots: [const { None }; N] }
    }

    /// Store `handler`; returns the app id to register it under, or `None`
    /// when the table is full.
    pub fn register(&mut self, handler: H) -> Option<u16> {
        let index = self.slots.iter().position(Option::is_none)?;
        self.slots[index] = Some(Slot { handler, gatts_if: None });
        Some(index as u16)
    }

    pub fn bind_interface(&mut self, app_id: u16, gatts_if: u8) -> bool {
        match self.slots.get_mut(usize::from(app_id)) {
            Some(Some(slot)) => {
                slot.gatts_if = Some(gatts_if);
                true
            }
            _ => false,
        }
    }

    pub fn resolve(&self, gatts_if: u8) -> Option<&H> {
        self.slots
            .iter()
            .flatten()
            .find(|s| s.gatts_if == Some(gatts_if))
            .map(|s| &s.handler)
    }

    pub fn by_app_id(&self, app_id: u16) -> Option<&H> {
        self.slots.get(usize::from(app_id))?.as_ref().map(|s| &s.handler)
    }

    pub fn handlers(&self) -> impl Iterator<Item = &H> {
        self.slots.iter().flatten().map(|s| &s.handler)
    }

    pub fn remove(&mut self, app_id: u16) -> Option<H> {
        self.slots.get_mut(usize::from(app_id))?.take().map(|s| s.handler)
    }
}
