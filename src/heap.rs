use crate::error::{LispError, LispResult};
use crate::value::{Kind, NativeId, SymbolId, Value, ValueRef};

/// A single arena slot.
#[derive(Clone, Copy)]
struct Slot {
    value: Value,
    /// Allocation stamp; bumped whenever the slot is reclaimed.
    stamp: u32,
    /// Generation in which the slot was last proven reachable.
    mark: u64,
}

/// Result of one sweep over the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Slots that were live before the sweep and are free now.
    pub reclaimed: usize,
    /// Free slots after the sweep, previously free ones included.
    pub free: usize,
}

/// The value arena. Every runtime value lives in one of its slots.
///
/// The arena never grows: it is sized once from the configuration and hands
/// out slots from an intrusive free list threaded through `Value::Free`.
pub struct Heap {
    slots: Vec<Slot>,
    free_head: Option<u32>,
    free_count: usize,
    /// Slots below this index are never swept.
    permanent_end: u32,
    /// One past the highest slot ever allocated.
    high_water: u32,
    generation: u64,
}

impl Heap {
    pub fn new(capacity: usize) -> Self {
        let reserved = ValueRef::RESERVED;
        let mut slots = Vec::with_capacity(capacity);
        slots.push(Slot { value: Value::Nil, stamp: 0, mark: 0 });
        slots.push(Slot { value: Value::Integer(1), stamp: 0, mark: 0 });
        slots.push(Slot { value: Value::Unbound, stamp: 0, mark: 0 });
        for i in reserved..capacity {
            let next = if i + 1 < capacity { Some(i as u32 + 1) } else { None };
            slots.push(Slot { value: Value::Free(next), stamp: 0, mark: 0 });
        }

        Heap {
            slots,
            free_head: if capacity > reserved { Some(reserved as u32) } else { None },
            free_count: capacity.saturating_sub(reserved),
            permanent_end: reserved as u32,
            high_water: reserved as u32,
            generation: 1,
        }
    }

    /// Pop the free-list head and store `value` in it.
    /// Returns `Ok(None)` when the free list is exhausted.
    pub fn try_alloc(&mut self, value: Value) -> LispResult<Option<ValueRef>> {
        let Some(index) = self.free_head else {
            return Ok(None);
        };
        let generation = self.generation;
        let slot = &mut self.slots[index as usize];
        match slot.value {
            Value::Free(next) => self.free_head = next,
            other => {
                return Err(LispError::Unreachable(format!(
                    "free list head {} holds a {}",
                    index,
                    other.kind()
                )))
            }
        }
        slot.value = value;
        slot.mark = generation;
        self.free_count -= 1;
        self.high_water = self.high_water.max(index + 1);
        Ok(Some(ValueRef::new(index, slot.stamp)))
    }

    /// Validate a handle before it is dereferenced.
    #[inline]
    pub fn check(&self, r: ValueRef) -> LispResult<()> {
        let slot = self.slots.get(r.index() as usize).ok_or_else(|| {
            LispError::Unreachable(format!("handle {:?} is outside the arena", r))
        })?;
        if slot.stamp != r.stamp() || matches!(slot.value, Value::Free(_)) {
            return Err(LispError::UseAfterFree { index: r.index() });
        }
        Ok(())
    }

    /// Read a slot's value.
    #[inline]
    pub fn get(&self, r: ValueRef) -> LispResult<Value> {
        self.check(r)?;
        Ok(self.slots[r.index() as usize].value)
    }

    pub fn kind(&self, r: ValueRef) -> LispResult<Kind> {
        Ok(self.get(r)?.kind())
    }

    pub fn int(&self, r: ValueRef) -> LispResult<i64> {
        match self.get(r)? {
            Value::Integer(n) => Ok(n),
            other => Err(wrong_kind(Kind::Integer, other)),
        }
    }

    pub fn pair(&self, r: ValueRef) -> LispResult<(ValueRef, ValueRef)> {
        match self.get(r)? {
            Value::Pair(head, tail) => Ok((head, tail)),
            other => Err(wrong_kind(Kind::Pair, other)),
        }
    }

    pub fn head(&self, r: ValueRef) -> LispResult<ValueRef> {
        Ok(self.pair(r)?.0)
    }

    pub fn tail(&self, r: ValueRef) -> LispResult<ValueRef> {
        Ok(self.pair(r)?.1)
    }

    pub fn symbol(&self, r: ValueRef) -> LispResult<SymbolId> {
        match self.get(r)? {
            Value::Symbol(id) => Ok(id),
            other => Err(wrong_kind(Kind::Symbol, other)),
        }
    }

    /// Capability handle of a native procedure or native macro.
    pub fn native(&self, r: ValueRef) -> LispResult<NativeId> {
        match self.get(r)? {
            Value::NativeProc(id) | Value::NativeMacro(id) => Ok(id),
            other => Err(wrong_kind(Kind::NativeProc, other)),
        }
    }

    /// The `idx`-th element of a list.
    pub fn elem(&self, list: ValueRef, idx: usize) -> LispResult<ValueRef> {
        let mut current = list;
        for _ in 0..idx {
            current = self.tail(current)?;
        }
        self.head(current)
    }

    /// Returns true if `r` is a chain of pairs terminated by `Nil`.
    pub fn is_proper_list(&self, r: ValueRef) -> LispResult<bool> {
        let mut current = r;
        loop {
            match self.get(current)? {
                Value::Nil => return Ok(true),
                Value::Pair(_, tail) => current = tail,
                _ => return Ok(false),
            }
        }
    }

    /// Collect a proper list into a Vec. A non-nil tail is dropped.
    pub fn list_to_vec(&self, r: ValueRef) -> LispResult<Vec<ValueRef>> {
        let mut items = Vec::new();
        let mut current = r;
        while let Value::Pair(head, tail) = self.get(current)? {
            items.push(head);
            current = tail;
        }
        Ok(items)
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn free_count(&self) -> usize {
        self.free_count
    }

    pub fn live_count(&self) -> usize {
        self.slots.len() - self.free_count
    }

    /// Percentage of the arena in use, rounded like the admission check.
    pub fn usage_percent(&self) -> usize {
        100 - 100 * self.free_count / self.slots.len()
    }

    pub fn permanent_len(&self) -> usize {
        self.permanent_end as usize
    }

    /// Freeze everything allocated so far as the permanent region.
    pub fn seal_permanent(&mut self) {
        self.permanent_end = self.high_water;
    }

    /// Every slot that currently holds a value, with a handle to it.
    pub fn live_slots(&self) -> impl Iterator<Item = (ValueRef, Value)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, slot)| match slot.value {
            Value::Free(_) => None,
            value => Some((ValueRef::new(i as u32, slot.stamp), value)),
        })
    }

    // === GC methods ===

    /// Start a new collection cycle.
    pub fn advance_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Stamp a root with the current generation. Pairs stamped for the first
    /// time this cycle are queued so their children get marked.
    pub fn mark_value(&mut self, r: ValueRef, worklist: &mut Vec<ValueRef>) -> LispResult<()> {
        self.check(r)?;
        let generation = self.generation;
        let slot = &mut self.slots[r.index() as usize];
        if slot.mark != generation {
            slot.mark = generation;
            if let Value::Pair(..) = slot.value {
                worklist.push(r);
            }
        }
        Ok(())
    }

    /// Stamp every slot in the permanent region. Returns how many were
    /// stamped.
    pub fn mark_permanent(&mut self, worklist: &mut Vec<ValueRef>) -> LispResult<usize> {
        let mut marked = 0;
        for i in 0..self.permanent_end {
            let slot = self.slots[i as usize];
            if matches!(slot.value, Value::Free(_)) {
                continue;
            }
            self.mark_value(ValueRef::new(i, slot.stamp), worklist)?;
            marked += 1;
        }
        Ok(marked)
    }

    /// Drain the worklist, stamping the head and tail of each pair.
    pub fn process_worklist(&mut self, worklist: &mut Vec<ValueRef>) -> LispResult<()> {
        while let Some(r) = worklist.pop() {
            let (head, tail) = self.pair(r)?;
            self.mark_value(head, worklist)?;
            self.mark_value(tail, worklist)?;
        }
        Ok(())
    }

    /// Number of slots stamped with the current generation.
    pub fn marked_count(&self) -> usize {
        self.slots.iter().filter(|s| s.mark == self.generation).count()
    }

    /// Reclaim every non-permanent slot not stamped this cycle. Symbols are
    /// kept regardless so interned identity survives. The free list is
    /// rebuilt lowest index first.
    pub fn sweep(&mut self) -> SweepOutcome {
        let mut reclaimed = 0;
        let mut free = 0;
        let mut next: Option<u32> = None;
        let generation = self.generation;
        for i in (self.permanent_end as usize..self.slots.len()).rev() {
            let slot = &mut self.slots[i];
            match slot.value {
                Value::Symbol(_) => continue,
                Value::Free(_) => {}
                _ if slot.mark == generation => continue,
                _ => {
                    slot.stamp = slot.stamp.wrapping_add(1);
                    reclaimed += 1;
                }
            }
            slot.value = Value::Free(next);
            next = Some(i as u32);
            free += 1;
        }
        self.free_head = next;
        self.free_count = free;
        SweepOutcome { reclaimed, free }
    }
}

fn wrong_kind(expected: Kind, found: Value) -> LispError {
    LispError::WrongKind { expected, found: found.kind() }
}
