//! Simulated process variables: a fake allocator/GC plus a handful of random
//! published values, advanced one tick at a time.

use expviz::types::{MemStats, PauseHistogram, SizeClass};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use std::time::{SystemTime, UNIX_EPOCH};

// Small-object size classes (bytes); anything larger is a large allocation.
const SIZE_CLASSES: [u32; 14] = [
    0, 8, 16, 32, 64, 128, 256, 512, 1024, 2048, 4096, 8192, 16384, 32768,
];
const MIN_NEXT_GC: u64 = 4 << 20;

pub struct Noise {
    rng: StdRng,
    memstats: MemStats,
    random_float: f64,
    random_int: i64,
    random_string: String,
    map_float: f64,
    map_int: i64,
}

impl Noise {
    pub fn new(seed: u64) -> Self {
        let memstats = MemStats {
            sys: 8 << 20,
            heap_sys: 6 << 20,
            stack_inuse: 256 << 10,
            stack_sys: 256 << 10,
            mspan_sys: 32 << 10,
            mcache_sys: 16 << 10,
            buck_hash_sys: 4 << 10,
            gc_sys: 256 << 10,
            other_sys: 512 << 10,
            next_gc: MIN_NEXT_GC,
            enable_gc: true,
            by_size: SIZE_CLASSES
                .iter()
                .map(|&size| SizeClass { size, ..Default::default() })
                .collect(),
            ..Default::default()
        };
        Self {
            rng: StdRng::seed_from_u64(seed),
            memstats,
            random_float: 0.0,
            random_int: 0,
            random_string: String::new(),
            map_float: 0.0,
            map_int: 0,
        }
    }

    pub fn memstats(&self) -> &MemStats {
        &self.memstats
    }

    /// One round of garbage plus fresh random values.
    pub fn tick(&mut self) {
        let big = self.rng.gen_range(0..1_000_000u64);
        self.alloc(big);
        for _ in 0..self.rng.gen_range(1..64) {
            let size = self.rng.gen_range(1..=32_768u64);
            self.alloc(size);
        }
        if self.memstats.heap_alloc >= self.memstats.next_gc {
            self.collect();
        }

        self.random_float = self.rng.gen();
        self.random_int = self.rng.gen_range(0..42);
        self.random_string = format!("derp {}", self.rng.gen_range(0..1_000_000));
        self.map_float += self.rng.gen::<f64>();
        self.map_int += self.rng.gen_range(0..42i64);
    }

    fn alloc(&mut self, size: u64) {
        let m = &mut self.memstats;
        m.mallocs += 1;
        m.alloc += size;
        m.total_alloc += size;
        m.heap_alloc += size;
        m.heap_objects += 1;
        m.heap_inuse = m.heap_alloc;
        m.heap_sys = m.heap_sys.max(m.heap_inuse);
        m.heap_idle = m.heap_sys - m.heap_inuse;
        if let Some(class) = m
            .by_size
            .iter_mut()
            .find(|c| c.size > 0 && u64::from(c.size) >= size)
        {
            class.mallocs += 1;
        }
    }

    fn collect(&mut self) {
        let pause = self.rng.gen_range(50_000..500_000u64);
        let survivors = self.rng.gen_range(0.05..0.3);
        let now_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();

        let m = &mut self.memstats;
        let live_objects = (m.heap_objects as f64 * survivors) as u64;
        m.frees += m.heap_objects - live_objects;
        m.heap_objects = live_objects;
        m.heap_alloc = (m.heap_alloc as f64 * survivors) as u64;
        m.alloc = m.heap_alloc;
        m.heap_inuse = m.heap_alloc;
        m.heap_idle = m.heap_sys - m.heap_inuse;
        for class in m.by_size.iter_mut() {
            let live = class.mallocs - class.frees;
            class.frees += live - (live as f64 * survivors) as u64;
        }

        m.num_gc += 1;
        let slot = PauseHistogram::slot_for(m.num_gc);
        m.pause_ns[slot] = pause;
        m.pause_end[slot] = now_ns;
        m.pause_total_ns += pause;
        m.last_gc = now_ns;
        m.next_gc = (m.heap_alloc * 2).max(MIN_NEXT_GC);
        m.gc_cpu_fraction = (m.pause_total_ns as f64 / 1e9).min(1.0) * 0.01;
    }

    /// The `/debug/vars` document for the current state.
    pub fn document(&self, cmdline: &[String]) -> Value {
        json!({
            "cmdline": cmdline,
            "memstats": &self.memstats,
            "im.a.random.float": self.random_float,
            "im.a.random.int": self.random_int,
            "im.a.random.string": self.random_string,
            "im.a.random.map": {
                "a.float": self.map_float,
                "a.int": self.map_int,
            },
        })
    }
}
