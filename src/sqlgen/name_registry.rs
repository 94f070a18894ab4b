use indexmap::IndexMap;

/// Case-insensitive map keyed by SQL names, iterating in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct NameMap<V> {
    inner: IndexMap<String, V>,
}

impl<V> Default for NameMap<V> {
    fn default() -> Self {
        Self { inner: IndexMap::new() }
    }
}

impl<V> NameMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(name: &str) -> String {
        name.to_lowercase()
    }

    pub fn get(&self, name: &str) -> Option<&V> {
        self.inner.get(&Self::key(name))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut V> {
        self.inner.get_mut(&Self::key(name))
    }

    pub fn insert(&mut self, name: &str, value: V) -> Option<V> {
        self.inner.insert(Self::key(name), value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(&Self::key(name))
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.inner.values()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Names used so far in one compile, with a per-name suffix counter.
#[derive(Debug, Clone, Default)]
pub struct NameRegistry {
    counters: NameMap<u32>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `name` and resets its counter.
    pub fn register(&mut self, name: &str) {
        self.counters.insert(name, 0);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.counters.contains(name)
    }

    /// Returns `base` followed by the next integer whose result is not claimed,
    /// and claims it. The counter of `base` remembers the suffix handed out.
    pub fn next_free(&mut self, base: &str) -> String {
        let mut i = self.counters.get(base).copied().unwrap_or(0);
        let candidate = loop {
            i += 1;
            let candidate = format!("{base}{i}");
            if !self.counters.contains(&candidate) {
                break candidate;
            }
        };
        self.counters.insert(base, i);
        self.counters.insert(&candidate, 0);
        candidate
    }
}

/// The two registries of a compile: FROM aliases and column names.
#[derive(Debug, Clone, Default)]
pub struct NameRegistries {
    pub extents: NameRegistry,
    pub columns: NameRegistry,
}
