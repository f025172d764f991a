//! Allocation and the tracing mark-and-sweep collector.
//!
//! Grounded on `examples/other_examples/.../woupiestek-rlox__src-memory.rs`'s
//! `Heap`: an intrusive list of every live allocation, a weak string-intern
//! table, and a two-phase mark/sweep pass driven from an explicit gray
//! worklist rather than recursion (so cyclic object graphs — an instance
//! holding a closure that closes over the instance itself — can't blow the
//! host stack).

use std::cell::Cell;
use std::ptr::NonNull;

use crate::config::{GC_HEAP_GROW_FACTOR, INITIAL_GC_THRESHOLD};
use crate::object::{ErasedGcRef, GcBox, GcHeader, GcRef, ObjString, Traceable};
use crate::table::{fnv1a_hash, Table};
use crate::tracer::Tracer;
use crate::value::Value;

pub struct Heap {
    objects: Vec<ErasedGcRef>,
    strings: Table,
    bytes_allocated: usize,
    next_gc: usize,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    pub fn new() -> Self {
        Heap {
            objects: Vec::new(),
            strings: Table::new(),
            bytes_allocated: 0,
            next_gc: INITIAL_GC_THRESHOLD,
        }
    }

    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    pub fn next_gc(&self) -> usize {
        self.next_gc
    }

    /// Whether a collection should run before the next allocation: either the
    /// heap has grown past its threshold, or `debug_stress_gc` demands one
    /// before every single allocation (spec.md §4.5's stress-testing knob).
    pub fn should_collect(&self, stress_gc: bool) -> bool {
        stress_gc || self.bytes_allocated > self.next_gc
    }

    pub fn alloc<T: Traceable>(&mut self, data: T) -> GcRef<T> {
        let boxed = Box::new(GcBox {
            header: GcHeader { kind: T::KIND, marked: Cell::new(false) },
            data,
        });
        self.bytes_allocated += std::mem::size_of::<GcBox<T>>();
        let ptr = NonNull::new(Box::into_raw(boxed)).expect("Box::into_raw is never null");
        let handle = GcRef::from_box(ptr);
        self.objects.push(handle.as_erased());
        handle
    }

    /// Interns `text`: returns the existing handle if an equal string is
    /// already on the heap, otherwise allocates a new one and adds it to the
    /// pool. Equal content always yields the same `GcRef` (spec.md §3
    /// invariant 1).
    pub fn intern(&mut self, text: &str) -> GcRef<ObjString> {
        let hash = fnv1a_hash(text.as_bytes());
        if let Some(existing) = self.strings.find_string(text, hash) {
            return existing;
        }
        let handle = self.alloc(ObjString { hash, chars: text.into() });
        self.strings.set(handle, Value::Nil);
        handle
    }

    /// Runs one full collection: mark every root and everything reachable
    /// from it, drop intern-table entries that didn't survive, then free
    /// every unmarked object. Returns the number of bytes reclaimed.
    pub fn collect_garbage<I>(&mut self, roots: I, tracer: &mut dyn Tracer) -> usize
    where
        I: IntoIterator<Item = ErasedGcRef>,
    {
        let before = self.bytes_allocated;
        tracer.on_gc_begin(before);

        let mut gray: Vec<ErasedGcRef> = Vec::new();
        for root in roots {
            if !root.is_marked() {
                root.set_marked(true);
                gray.push(root);
            }
        }

        let mut children = Vec::new();
        while let Some(obj) = gray.pop() {
            children.clear();
            obj.trace_children(&mut children);
            for child in children.drain(..) {
                if !child.is_marked() {
                    child.set_marked(true);
                    gray.push(child);
                }
            }
        }

        // Weak references: an interned string no class/instance/global still
        // points to must not keep itself alive (spec.md §4.5 item 4).
        self.strings.remove_white();

        let mut freed = 0usize;
        self.objects.retain(|obj| {
            if obj.is_marked() {
                obj.set_marked(false);
                true
            } else {
                freed += unsafe { obj.free() };
                false
            }
        });

        self.bytes_allocated -= freed;
        self.next_gc = self.bytes_allocated.max(INITIAL_GC_THRESHOLD) * GC_HEAP_GROW_FACTOR;
        tracer.on_gc_end(before, self.bytes_allocated, self.next_gc);
        freed
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        for obj in self.objects.drain(..) {
            unsafe {
                obj.free();
            }
        }
    }
}
