//! Serialized read-modify-write of shared control words.
//!
//! Each [`SharedRegister`] gets its own lock. Every writer to a given word
//! takes that word's lock, so two terminals owning different fields of the
//! same word can never lose each other's update.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::io::RegisterIo;
use crate::registry::SharedRegister;

/// Owner of the locks guarding the shared control words.
pub struct RegisterBroker {
    sync: Arc<dyn RegisterIo>,
    ctrl1: Mutex<()>,
    ctrl2: Mutex<()>,
}

impl RegisterBroker {
    /// Create a broker over the sync register block.
    pub fn new(sync: Arc<dyn RegisterIo>) -> Self {
        Self {
            sync,
            ctrl1: Mutex::new(()),
            ctrl2: Mutex::new(()),
        }
    }

    fn lock_for(&self, register: SharedRegister) -> &Mutex<()> {
        match register {
            SharedRegister::DStarACtrl1 => &self.ctrl1,
            SharedRegister::DStarACtrl2 => &self.ctrl2,
        }
    }

    /// Replace the bits under `mask` in `register` with `value`.
    ///
    /// Bits of `value` outside `mask` are dropped. Returns the word written.
    pub fn update_field(&self, register: SharedRegister, mask: u32, value: u32) -> u32 {
        let _guard = self.lock_for(register).lock();
        let offset = register.offset();
        let current = self.sync.read32(offset);
        let updated = (current & !mask) | (value & mask);
        self.sync.write32(offset, updated);
        trace!(
            register = ?register,
            old = format_args!("{:#010x}", current),
            new = format_args!("{:#010x}", updated),
            "Updated shared register field"
        );
        updated
    }

    /// Read a shared word under its lock.
    pub fn read(&self, register: SharedRegister) -> u32 {
        let _guard = self.lock_for(register).lock();
        self.sync.read32(register.offset())
    }
}

impl std::fmt::Debug for RegisterBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterBroker").finish_non_exhaustive()
    }
}
