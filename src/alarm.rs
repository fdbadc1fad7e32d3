//! Fixed-capacity table of periodic alarms.
//!
//! Each slot is either [`AlarmSlot::Free`] or holds an [`Alarm`] with its
//! handler, interval (in ticks), elapsed tick count and due flag. Counting
//! happens on every clock tick, inside the tick interrupt; handlers only ever
//! run later, from the main loop.
//!
//! # Due-flag coalescing
//!
//! When the elapsed count reaches the interval the due flag is set and the
//! count restarts from zero. The flag stays set until the alarm is raised, so
//! a period is never silently dropped, but several elapsed periods between
//! two raises collapse into a single handler call.

use core::fmt;

use heapless::Vec;

/// Default number of alarm slots.
pub const MAX_ALARMS: usize = 4;

/// Raw "no free slot" identifier, kept for diagnostics and wire formats.
pub const NO_FREE_SLOT: u8 = 0xFF;

/// Errors from alarm table operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum AlarmError {
    /// Every slot is in use
    TableFull,
}

impl AlarmError {
    /// Raw sentinel equivalent of this error.
    pub const fn code(self) -> u8 {
        match self {
            Self::TableFull => NO_FREE_SLOT,
        }
    }
}

impl fmt::Display for AlarmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TableFull => write!(f, "Alarm table full"),
        }
    }
}

impl core::error::Error for AlarmError {}

/// Identifier of an alarm slot.
///
/// Any `u8` converts into an `AlarmId`; identifiers outside the table are
/// ignored by [`AlarmTable::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct AlarmId(u8);

impl AlarmId {
    /// Slot index in the alarm table.
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Raw slot number; [`NO_FREE_SLOT`] is never a valid one.
    pub const fn raw(self) -> u8 {
        self.0
    }
}

impl From<u8> for AlarmId {
    fn from(raw: u8) -> Self {
        Self(raw)
    }
}

/// Code run when an alarm is raised.
///
/// `ctx` is whatever the main loop passes to `raise_alarms`, typically the
/// application state owning the sensors and radio.
pub trait AlarmHandler<C: ?Sized> {
    fn on_alarm(&self, ctx: &mut C);
}

impl<C: ?Sized> AlarmHandler<C> for fn() {
    fn on_alarm(&self, _ctx: &mut C) {
        self()
    }
}

impl<C: ?Sized> AlarmHandler<C> for fn(&mut C) {
    fn on_alarm(&self, ctx: &mut C) {
        self(ctx)
    }
}

/// An installed periodic alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alarm<H> {
    handler: H,
    interval: u32,
    elapsed: u32,
    due: bool,
}

impl<H> Alarm<H> {
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Ticks between raises.
    pub fn interval(&self) -> u32 {
        self.interval
    }

    /// Ticks counted since the last threshold crossing.
    pub fn elapsed(&self) -> u32 {
        self.elapsed
    }

    pub fn is_due(&self) -> bool {
        self.due
    }
}

/// One entry of the alarm table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmSlot<H> {
    Free,
    Armed(Alarm<H>),
}

/// Alarm table with `N` slots and no dynamic allocation.
pub struct AlarmTable<H, const N: usize = MAX_ALARMS> {
    slots: [AlarmSlot<H>; N],
}

impl<H, const N: usize> Default for AlarmTable<H, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H, const N: usize> AlarmTable<H, N> {
    /// Creates a table with every slot free.
    pub const fn new() -> Self {
        Self {
            slots: [const { AlarmSlot::Free }; N],
        }
    }

    /// Number of slots, free or armed.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Installs an alarm due every `interval` ticks in the first free slot.
    ///
    /// An interval of 0 is stored as 1, so the alarm is due on every tick.
    pub fn add(&mut self, interval: u32, handler: H) -> Result<AlarmId, AlarmError> {
        let index = self
            .slots
            .iter()
            .position(|slot| matches!(slot, AlarmSlot::Free))
            .ok_or(AlarmError::TableFull)?;
        self.slots[index] = AlarmSlot::Armed(Alarm {
            handler,
            interval: interval.max(1),
            elapsed: 0,
            due: false,
        });
        Ok(AlarmId(index as u8))
    }

    /// Frees a slot. Identifiers outside the table are ignored.
    pub fn remove(&mut self, id: AlarmId) {
        if let Some(slot) = self.slots.get_mut(id.index()) {
            *slot = AlarmSlot::Free;
        }
    }

    /// The alarm in slot `id`, if one is armed there.
    pub fn get(&self, id: AlarmId) -> Option<&Alarm<H>> {
        match self.slots.get(id.index()) {
            Some(AlarmSlot::Armed(alarm)) => Some(alarm),
            _ => None,
        }
    }

    pub fn slot(&self, id: AlarmId) -> Option<&AlarmSlot<H>> {
        self.slots.get(id.index())
    }

    /// Number of armed slots.
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot, AlarmSlot::Armed(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counts one tick on every armed alarm.
    ///
    /// Interrupt safe: touches plain data only.
    pub fn count_tick(&mut self) {
        for slot in self.slots.iter_mut() {
            if let AlarmSlot::Armed(alarm) = slot {
                alarm.elapsed = alarm.elapsed.saturating_add(1);
                if alarm.elapsed >= alarm.interval {
                    // Stays set until the alarm is raised
                    alarm.due = true;
                    alarm.elapsed = 0;
                }
            }
        }
    }
}

impl<H: Copy, const N: usize> AlarmTable<H, N> {
    /// Clears the due flag of one slot and returns its handler if it was due.
    ///
    /// Free slots and identifiers outside the table yield `None`.
    pub fn take_due_at(&mut self, id: AlarmId) -> Option<H> {
        match self.slots.get_mut(id.index()) {
            Some(AlarmSlot::Armed(alarm)) if alarm.due => {
                alarm.due = false;
                Some(alarm.handler)
            }
            _ => None,
        }
    }

    /// Clears every due flag and returns the matching handlers in slot order.
    pub fn take_due(&mut self) -> Vec<(AlarmId, H), N> {
        let mut due = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let AlarmSlot::Armed(alarm) = slot {
                if alarm.due {
                    alarm.due = false;
                    // At most N entries, one per slot
                    let _ = due.push((AlarmId(index as u8), alarm.handler));
                }
            }
        }
        due
    }
}
