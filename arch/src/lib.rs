//! GBA Architecture
//!
//! Address-agnostic emulation primitives shared by every hardware block in
//! `gba-core`: a tick lifecycle ([`Block`]), register load/store
//! ([`reg::Register`], [`reg::Port`]), fallible byte-addressed memory
//! ([`mem::Memory`]), and a range-mapped address [`mio::Bus`].
//!
//! Unlike the Game Boy, whose address space fits in 16 bits, the GBA exposes
//! a 256 MiB flat view, so [`Word`] here is `u32` rather than `u16`.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod blk;

pub mod dev;
pub mod mem;
pub mod mio;
pub mod reg;

use std::cell::RefCell;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

pub use crate::blk::Block;

/// Native architecture byte.
pub type Byte = u8;
/// Native architecture word: a 32-bit address or bus value.
pub type Word = u32;

/// Shared memory-mapped device.
#[derive(Debug, Default)]
pub struct Shared<T: ?Sized>(Inner<T>);

/// Underlying shared pointer.
type Inner<T> = Rc<RefCell<T>>;

impl<T> Shared<T> {
    pub fn new(value: T) -> Self {
        Self(Rc::new(RefCell::new(value)))
    }
}

impl<T: ?Sized> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T: ?Sized> Deref for Shared<T> {
    type Target = Inner<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T: ?Sized> DerefMut for Shared<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<T: ?Sized> PartialEq for Shared<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(self, other)
    }
}

impl<T> From<T> for Shared<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}
