//! Registry of input source buffers.
//!
//! The registry owns every byte of input the driver works on. Ingestion
//! always deep-copies: callers remain free to mutate or discard their
//! originals after `add_buffer` returns. Ids are assigned monotonically
//! and the registration order is the order the pump consumes buffers in.

use crate::error::FrontendError;
use crate::span::FileId;

/// Stable, session-scoped identifier of one registered buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

impl BufferId {
    /// The file id used for spans pointing into this buffer.
    pub fn file_id(self) -> FileId {
        FileId(self.0)
    }
}

/// One registry-owned input buffer.
#[derive(Debug, Clone)]
pub struct Buffer {
    pub id: BufferId,
    /// Path or synthetic name, used only for display.
    pub display_name: String,
    pub text: String,
}

/// Owns all raw input bytes of one driver session.
///
/// Besides the buffers themselves the registry tracks at most one
/// script-header marker and at most one completion point.
#[derive(Debug, Default)]
pub struct BufferRegistry {
    buffers: Vec<Buffer>,
    script_header: Option<BufferId>,
    completion: Option<(BufferId, u32)>,
}

impl BufferRegistry {
    pub fn new() -> BufferRegistry {
        BufferRegistry::default()
    }

    /// Copy `text` into registry-owned storage and assign the next id.
    pub fn add_buffer(&mut self, text: &str, display_name: &str) -> BufferId {
        let id = BufferId(self.buffers.len() as u32);
        self.buffers.push(Buffer {
            id,
            display_name: display_name.to_owned(),
            text: text.to_owned(),
        });
        id
    }

    pub fn get(&self, id: BufferId) -> &Buffer {
        &self.buffers[id.0 as usize]
    }

    /// Buffer ids in registration order.
    pub fn ids(&self) -> impl Iterator<Item = BufferId> + '_ {
        self.buffers.iter().map(|b| b.id)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Flag that the first line of `id`, if it is a `#!` line, must be
    /// excluded from parsing. Main-mode files only; one per session.
    pub fn mark_script_header(&mut self, id: BufferId) {
        debug_assert!(
            self.script_header.is_none() || self.script_header == Some(id),
            "script header marker is already assigned to another buffer"
        );
        self.script_header = Some(id);
    }

    pub fn is_script_header(&self, id: BufferId) -> bool {
        self.script_header == Some(id)
    }

    /// Record the completion point. At most one may exist per session; a
    /// second call is a configuration error, never a silent overwrite.
    pub fn set_completion_point(
        &mut self,
        id: BufferId,
        offset: u32,
    ) -> Result<(), FrontendError> {
        if self.completion.is_some() {
            return Err(FrontendError::CompletionPointConflict);
        }
        self.completion = Some((id, offset));
        Ok(())
    }

    pub fn completion_point(&self) -> Option<(BufferId, u32)> {
        self.completion
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assigns_monotonic_ids_in_registration_order() {
        let mut registry = BufferRegistry::new();
        let a = registry.add_buffer("fn a() { 1 }", "a.sbl");
        let b = registry.add_buffer("fn b() { 2 }", "b.sbl");
        assert_eq!(a, BufferId(0));
        assert_eq!(b, BufferId(1));
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec![a, b]);
    }

    #[test]
    fn ingestion_copies_instead_of_aliasing() {
        let mut registry = BufferRegistry::new();
        let mut original = String::from("let x = 1;");
        let saved = original.clone();
        let id = registry.add_buffer(&original, "input.sbl");

        original.push_str(" let y = 2;");
        assert_eq!(registry.get(id).text, saved);
    }

    #[test]
    fn rejects_a_second_completion_point() {
        let mut registry = BufferRegistry::new();
        let a = registry.add_buffer("", "a.sbl");
        let b = registry.add_buffer("", "b.sbl");
        registry.set_completion_point(a, 3).expect("first set");
        let err = registry.set_completion_point(b, 7).unwrap_err();
        assert!(matches!(err, FrontendError::CompletionPointConflict));
        assert_eq!(registry.completion_point(), Some((a, 3)));
    }
}
