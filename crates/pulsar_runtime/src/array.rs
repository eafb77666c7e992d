//! Multi-port register arrays with staged writes.
//!
//! Reads always see the committed payload. Writes are staged as
//! [`WriteRecord`]s carrying the effective stamp, the writer's name, and
//! the writer's arbitration port, then applied in stamp order by
//! [`RegArray::tick`]. Two writers granted distinct ports may both commit
//! in the same cycle; port-to-cell resolution is the IR's contract, not
//! the runtime's.

/// One staged array write.
#[derive(Debug, Clone)]
pub struct WriteRecord<T> {
    /// The stamp at which this write becomes visible.
    pub stamp: usize,
    /// The written element index.
    pub idx: usize,
    /// The written value.
    pub value: T,
    /// The writing module's name.
    pub writer: &'static str,
    /// The writer's arbitration port index.
    pub port: usize,
}

impl<T> WriteRecord<T> {
    /// Creates a staged write record.
    pub fn new(stamp: usize, idx: usize, value: T, writer: &'static str, port: usize) -> Self {
        Self {
            stamp,
            idx,
            value,
            writer,
            port,
        }
    }
}

/// A register file / memory with per-writer arbitration ports.
#[derive(Debug, Clone)]
pub struct RegArray<T> {
    /// The committed storage, indexable by generated code.
    pub payload: Vec<T>,
    staged: Vec<WriteRecord<T>>,
    ports: usize,
}

impl<T: Clone + Default> RegArray<T> {
    /// Creates a zero-initialized array sized for `ports` concurrent writers.
    pub fn with_ports(size: usize, ports: usize) -> Self {
        Self {
            payload: vec![T::default(); size],
            staged: Vec::new(),
            ports: ports.max(1),
        }
    }

    /// Creates a pre-initialized array; missing elements are zero-filled up
    /// to `size`.
    pub fn with_init_and_ports(mut init: Vec<T>, size: usize, ports: usize) -> Self {
        assert!(init.len() <= size, "initializer longer than the array");
        init.resize(size, T::default());
        Self {
            payload: init,
            staged: Vec::new(),
            ports: ports.max(1),
        }
    }

    /// The number of arbitration ports.
    pub fn port_count(&self) -> usize {
        self.ports
    }

    /// The number of elements.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// `true` when the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Stages a write.
    ///
    /// # Panics
    ///
    /// Panics when the record's port exceeds the arbitrated port count or
    /// its index exceeds the array size.
    pub fn stage_write(&mut self, record: WriteRecord<T>) {
        assert!(
            record.port < self.ports,
            "write from {} uses unarbitrated port {}",
            record.writer,
            record.port
        );
        assert!(
            record.idx < self.payload.len(),
            "write from {} out of bounds: {}",
            record.writer,
            record.idx
        );
        self.staged.push(record);
    }

    /// Commits every staged write whose stamp has arrived, in stamp order.
    pub fn tick(&mut self, stamp: usize) {
        let mut due: Vec<WriteRecord<T>> = Vec::new();
        self.staged.retain_mut(|record| {
            if record.stamp <= stamp {
                due.push(record.clone());
                false
            } else {
                true
            }
        });
        due.sort_by_key(|r| r.stamp);
        for record in due {
            self.payload[record.idx] = record.value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_is_invisible_until_tick() {
        let mut arr: RegArray<u32> = RegArray::with_ports(4, 1);
        arr.stage_write(WriteRecord::new(150, 0, 42, "Driver", 0));
        assert_eq!(arr.payload[0], 0);
        arr.tick(150);
        assert_eq!(arr.payload[0], 42);
    }

    #[test]
    fn init_is_zero_extended() {
        let arr: RegArray<u16> = RegArray::with_init_and_ports(vec![1, 2], 4, 1);
        assert_eq!(arr.payload, vec![1, 2, 0, 0]);
    }

    #[test]
    fn distinct_ports_both_commit() {
        let mut arr: RegArray<u32> = RegArray::with_ports(4, 2);
        arr.stage_write(WriteRecord::new(150, 0, 10, "A", 0));
        arr.stage_write(WriteRecord::new(150, 1, 20, "B", 1));
        arr.tick(150);
        assert_eq!(arr.payload[0], 10);
        assert_eq!(arr.payload[1], 20);
    }

    #[test]
    fn future_writes_stay_staged() {
        let mut arr: RegArray<u32> = RegArray::with_ports(2, 1);
        arr.stage_write(WriteRecord::new(250, 0, 5, "A", 0));
        arr.tick(150);
        assert_eq!(arr.payload[0], 0);
        arr.tick(250);
        assert_eq!(arr.payload[0], 5);
    }

    #[test]
    fn commits_follow_stamp_order() {
        let mut arr: RegArray<u32> = RegArray::with_ports(1, 1);
        arr.stage_write(WriteRecord::new(250, 0, 2, "A", 0));
        arr.stage_write(WriteRecord::new(150, 0, 1, "A", 0));
        arr.tick(250);
        // The later stamp wins even though it was staged first.
        assert_eq!(arr.payload[0], 2);
    }

    #[test]
    #[should_panic(expected = "unarbitrated port")]
    fn unarbitrated_port_is_fatal() {
        let mut arr: RegArray<u32> = RegArray::with_ports(2, 1);
        arr.stage_write(WriteRecord::new(150, 0, 1, "A", 1));
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn out_of_bounds_write_is_fatal() {
        let mut arr: RegArray<u32> = RegArray::with_ports(2, 1);
        arr.stage_write(WriteRecord::new(150, 5, 1, "A", 0));
    }
}
