use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

pub trait MutexExt<T> {
    fn lock_pe(&self) -> MutexGuard<T>;
}

impl<T> MutexExt<T> for Mutex<T> {
    fn lock_pe(&self) -> MutexGuard<T> {
        match self.lock() {
            Ok(mg) => mg,
            Err(pe) => {
                warn!("Mutex poisoned: {}", pe);
                pe.into_inner()
            }
        }
    }
}

pub trait RwLockExt<T> {
    fn read_pe(&self) -> RwLockReadGuard<T>;
    fn write_pe(&self) -> RwLockWriteGuard<T>;
}

impl<T> RwLockExt<T> for RwLock<T> {
    fn read_pe(&self) -> RwLockReadGuard<T> {
        match self.read() {
            Ok(rg) => rg,
            Err(pe) => {
                warn!("RwLock poisoned: {}", pe);
                pe.into_inner()
            }
        }
    }

    fn write_pe(&self) -> RwLockWriteGuard<T> {
        match self.write() {
            Ok(wg) => wg,
            Err(pe) => {
                warn!("RwLock poisoned: {}", pe);
                pe.into_inner()
            }
        }
    }
}
