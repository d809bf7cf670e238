//! Double-buffered typed event streams.
//!
//! Each stream holds a pending `write_buffer` and the currently-visible
//! `read_buffer`. `swap_buffers` is the single ordering point that promotes
//! pending events to visible ones; replay injects directly into the read
//! buffer so consumers see replayed events without a swap.

use std::any::TypeId;
use std::collections::HashMap;

use crate::error::{EcsError, EcsResult};

struct Stream {
    element_size: usize,
    write_buffer: Vec<u8>,
    read_buffer: Vec<u8>,
}

impl Stream {
    fn new(element_size: usize) -> Self {
        Self {
            element_size,
            write_buffer: Vec::new(),
            read_buffer: Vec::new(),
        }
    }
}

/// Like `Stream` but each event is an opaque, variable-length codec payload
/// rather than a fixed-size `Copy` value reinterpreted as bytes.
#[derive(Default)]
struct ManagedStream {
    write_buffer: Vec<Vec<u8>>,
    read_buffer: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Copy)]
pub struct StreamView<'a> {
    pub type_id: u64,
    pub element_size: usize,
    pub read_buffer: &'a [u8],
    pub write_buffer: &'a [u8],
}

#[derive(Default)]
pub struct EventBus {
    streams: HashMap<TypeId, Stream>,
    managed_streams: HashMap<TypeId, ManagedStream>,
    /// Stable opaque ids for `inject_into_current_by_size`, keyed by the
    /// caller-chosen recorder type id rather than Rust's `TypeId`.
    by_recorder_id: HashMap<u16, TypeId>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish<T: Copy + 'static>(&mut self, value: T) {
        let key = TypeId::of::<T>();
        let element_size = std::mem::size_of::<T>();
        let stream = self
            .streams
            .entry(key)
            .or_insert_with(|| Stream::new(element_size));
        // SAFETY: `value: T` is exactly `element_size` bytes; we only ever
        // read it back through the same `T` in `consume`.
        let bytes =
            unsafe { std::slice::from_raw_parts(&value as *const T as *const u8, element_size) };
        stream.write_buffer.extend_from_slice(bytes);
    }

    /// Analogous to `publish`, but the payload is already-serialized codec
    /// bytes rather than a `Copy` value reinterpreted in place. Used for
    /// event types that carry non-`Copy` managed data.
    pub fn publish_managed<T: 'static>(&mut self, bytes: Vec<u8>) {
        let key = TypeId::of::<T>();
        self.managed_streams
            .entry(key)
            .or_default()
            .write_buffer
            .push(bytes);
    }

    pub fn consume_managed<T: 'static>(&self) -> &[Vec<u8>] {
        let key = TypeId::of::<T>();
        match self.managed_streams.get(&key) {
            Some(stream) => &stream.read_buffer,
            None => &[],
        }
    }

    pub fn register_recorder_id<T: 'static>(&mut self, recorder_type_id: u16) {
        self.by_recorder_id
            .insert(recorder_type_id, TypeId::of::<T>());
    }

    pub fn swap_buffers(&mut self) {
        for stream in self.streams.values_mut() {
            stream.read_buffer.clear();
            std::mem::swap(&mut stream.read_buffer, &mut stream.write_buffer);
        }
        for stream in self.managed_streams.values_mut() {
            stream.read_buffer.clear();
            std::mem::swap(&mut stream.read_buffer, &mut stream.write_buffer);
        }
    }

    pub fn consume<T: Copy + 'static>(&self) -> EcsResult<&[T]> {
        let key = TypeId::of::<T>();
        let Some(stream) = self.streams.get(&key) else {
            return Ok(&[]);
        };
        let element_size = std::mem::size_of::<T>();
        if stream.read_buffer.len() % element_size != 0 {
            return Err(EcsError::CorruptFrame(
                "event read buffer length is not a multiple of element size".into(),
            ));
        }
        let count = stream.read_buffer.len() / element_size;
        // SAFETY: the buffer was populated exclusively via `publish::<T>` or
        // `inject_into_current`, both of which write whole `T`-sized
        // records; the length check above rules out a partial trailing
        // element.
        Ok(unsafe { std::slice::from_raw_parts(stream.read_buffer.as_ptr() as *const T, count) })
    }

    pub fn clear_current_buffers(&mut self) {
        for stream in self.streams.values_mut() {
            stream.read_buffer.clear();
        }
        for stream in self.managed_streams.values_mut() {
            stream.read_buffer.clear();
        }
    }

    /// Appends raw bytes to the read buffer of the stream registered under
    /// `recorder_type_id`, creating it if absent. Used by playback.
    pub fn inject_into_current_by_size(
        &mut self,
        recorder_type_id: u16,
        element_size: usize,
        bytes: &[u8],
    ) -> EcsResult<()> {
        let rust_key = self.by_recorder_id.get(&recorder_type_id).copied();
        let key = rust_key.unwrap_or_else(|| {
            // Falls back to a synthetic key so the stream still exists and
            // is inspectable even if the caller never registered T.
            TypeId::of::<()>()
        });
        let stream = self
            .streams
            .entry(key)
            .or_insert_with(|| Stream::new(element_size));
        stream.read_buffer.extend_from_slice(bytes);
        Ok(())
    }

    /// Pending (write-buffer) bytes for every *registered* stream with
    /// pending data, keyed by the recorder's own numeric type id rather
    /// than Rust's opaque `TypeId` so the frame format can carry it.
    pub fn pending_streams_by_recorder_id(&self) -> Vec<(u16, usize, &[u8])> {
        self.by_recorder_id
            .iter()
            .filter_map(|(&recorder_id, rust_id)| {
                let stream = self.streams.get(rust_id)?;
                if stream.write_buffer.is_empty() {
                    None
                } else {
                    Some((recorder_id, stream.element_size, stream.write_buffer.as_slice()))
                }
            })
            .collect()
    }

    pub fn debug_inspectors(&self) -> impl Iterator<Item = StreamView<'_>> {
        self.streams.iter().map(|(k, s)| StreamView {
            type_id: type_id_as_u64(*k),
            element_size: s.element_size,
            read_buffer: &s.read_buffer,
            write_buffer: &s.write_buffer,
        })
    }
}

/// `TypeId` has no stable numeric representation; this hashes it into a
/// `u64` purely for debug display purposes.
fn type_id_as_u64(id: TypeId) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    id.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct SimpleEvent {
        value: i32,
    }

    #[test]
    fn publish_swap_consume_round_trip() {
        let mut bus = EventBus::new();
        bus.publish(SimpleEvent { value: 77 });
        assert!(bus.consume::<SimpleEvent>().unwrap().is_empty());
        bus.swap_buffers();
        assert_eq!(bus.consume::<SimpleEvent>().unwrap(), &[SimpleEvent { value: 77 }]);
    }

    #[test]
    fn swap_clears_previous_read_buffer() {
        let mut bus = EventBus::new();
        bus.publish(SimpleEvent { value: 1 });
        bus.swap_buffers();
        bus.swap_buffers();
        assert!(bus.consume::<SimpleEvent>().unwrap().is_empty());
    }

    #[test]
    fn publish_managed_swap_consume_round_trip() {
        struct LogLine;
        let mut bus = EventBus::new();
        bus.publish_managed::<LogLine>(b"hello".to_vec());
        assert!(bus.consume_managed::<LogLine>().is_empty());
        bus.swap_buffers();
        assert_eq!(bus.consume_managed::<LogLine>(), &[b"hello".to_vec()]);
    }

    #[test]
    fn inject_into_current_appends_without_swap() {
        let mut bus = EventBus::new();
        bus.register_recorder_id::<SimpleEvent>(3);
        let value = SimpleEvent { value: 77 };
        let bytes = unsafe {
            std::slice::from_raw_parts(&value as *const _ as *const u8, std::mem::size_of::<SimpleEvent>())
        };
        bus.inject_into_current_by_size(3, std::mem::size_of::<SimpleEvent>(), bytes)
            .unwrap();
        assert_eq!(bus.consume::<SimpleEvent>().unwrap(), &[value]);
    }
}
