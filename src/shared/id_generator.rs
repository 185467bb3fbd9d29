use uuid::Uuid;

/// IdGenerator trait for abstracting record identifier generation
/// Stores use it to assign an identifier to every appended reading
pub trait IdGenerator: Send + Sync {
    /// Next record identifier, unique for the life of the generator
    fn next_id(&self) -> String;
}

/// Production implementation of IdGenerator handing out hyphenated UUID v4 strings
#[derive(Debug, Clone, Default)]
pub struct RandomIdGenerator;

impl RandomIdGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl IdGenerator for RandomIdGenerator {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Deterministic IdGenerator producing `rec-000001`, `rec-000002`, ...
/// Identifiers sort in allocation order, which keeps test expectations stable
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    next: std::sync::atomic::AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of identifiers handed out so far
    pub fn issued(&self) -> u64 {
        self.next.load(std::sync::atomic::Ordering::Relaxed)
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> String {
        let n = self
            .next
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            + 1;
        format!("rec-{:06}", n)
    }
}
