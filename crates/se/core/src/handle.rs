//! Handles and the slot arena behind them
//!
//! Handles are plain `Copy` keys. Every level of the hierarchy stores its children in an
//! [`Arena`]; removing an entry bumps the slot generation, so a handle to a closed entity is
//! recognised as stale instead of silently addressing whatever reuses the slot.

use std::sync::atomic::{AtomicU32, Ordering};

use derive_more::Display;

static NEXT_SERVICE_ID: AtomicU32 = AtomicU32::new(1);

/// Identity of one [`SeService`](crate::SeService) instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display("{_0}")]
pub(crate) struct ServiceId(u32);

impl ServiceId {
    pub(crate) fn next() -> Self {
        Self(NEXT_SERVICE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Index plus generation of an arena entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display("{index}.{generation}")]
pub(crate) struct Slot {
    index: u32,
    generation: u32,
}

/// Handle to a reader owned by a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display("reader {index}")]
pub struct ReaderHandle {
    pub(crate) service: ServiceId,
    pub(crate) index: u32,
}

/// Handle to a session on a reader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display("{reader}, session {slot}")]
pub struct SessionHandle {
    pub(crate) reader: ReaderHandle,
    pub(crate) slot: Slot,
}

impl SessionHandle {
    /// Reader this session was opened on
    pub const fn reader(&self) -> ReaderHandle {
        self.reader
    }
}

/// Handle to a channel within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display("{session}, channel {slot}")]
pub struct ChannelHandle {
    pub(crate) session: SessionHandle,
    pub(crate) slot: Slot,
}

impl ChannelHandle {
    /// Session owning this channel
    pub const fn session(&self) -> SessionHandle {
        self.session
    }
}

/// Why an arena lookup failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Miss {
    /// The slot existed and has since been removed
    Stale,
    /// The slot was never handed out
    Unknown,
}

#[derive(Debug)]
enum Entry<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32 },
}

/// Generation checked slot storage
#[derive(Debug)]
pub(crate) struct Arena<T> {
    entries: Vec<Entry<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }
}

impl<T> Arena<T> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    pub(crate) const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn insert(&mut self, value: T) -> Slot {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let entry = &mut self.entries[index as usize];
            let generation = match entry {
                Entry::Vacant { generation } => *generation,
                Entry::Occupied { generation, .. } => *generation,
            };
            *entry = Entry::Occupied { generation, value };
            return Slot { index, generation };
        }

        let index = self.entries.len() as u32;
        self.entries.push(Entry::Occupied {
            generation: 0,
            value,
        });
        Slot {
            index,
            generation: 0,
        }
    }

    fn check(&self, slot: Slot) -> Result<usize, Miss> {
        let index = slot.index as usize;
        match self.entries.get(index) {
            None => Err(Miss::Unknown),
            Some(Entry::Occupied { generation, .. }) if *generation == slot.generation => Ok(index),
            Some(Entry::Occupied { generation, .. } | Entry::Vacant { generation }) => {
                if slot.generation < *generation {
                    Err(Miss::Stale)
                } else {
                    Err(Miss::Unknown)
                }
            }
        }
    }

    pub(crate) fn get(&self, slot: Slot) -> Result<&T, Miss> {
        let index = self.check(slot)?;
        match &self.entries[index] {
            Entry::Occupied { value, .. } => Ok(value),
            Entry::Vacant { .. } => Err(Miss::Stale),
        }
    }

    pub(crate) fn get_mut(&mut self, slot: Slot) -> Result<&mut T, Miss> {
        let index = self.check(slot)?;
        match &mut self.entries[index] {
            Entry::Occupied { value, .. } => Ok(value),
            Entry::Vacant { .. } => Err(Miss::Stale),
        }
    }

    pub(crate) fn remove(&mut self, slot: Slot) -> Result<T, Miss> {
        let index = self.check(slot)?;
        let next = Entry::Vacant {
            generation: slot.generation.wrapping_add(1),
        };
        match std::mem::replace(&mut self.entries[index], next) {
            Entry::Occupied { value, .. } => {
                self.free.push(slot.index);
                self.len -= 1;
                Ok(value)
            }
            vacant @ Entry::Vacant { .. } => {
                self.entries[index] = vacant;
                Err(Miss::Stale)
            }
        }
    }

    /// Slots of all live entries, in index order
    pub(crate) fn slots(&self) -> Vec<Slot> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| match entry {
                Entry::Occupied { generation, .. } => Some(Slot {
                    index: index as u32,
                    generation: *generation,
                }),
                Entry::Vacant { .. } => None,
            })
            .collect()
    }
}
