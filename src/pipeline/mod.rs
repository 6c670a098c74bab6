//! The batch OCR pipeline: batch → document → page.

pub mod batch;
pub mod document;
pub mod events;
pub mod page;
#[cfg(test)]
pub mod testing;
