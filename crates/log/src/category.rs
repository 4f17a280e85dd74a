use std::sync::atomic::{AtomicU32, Ordering};

/// Subsystems with their own debug switch.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Category {
    Spork,
    Stake,
    Checkpoint,
    Net,
    Reindex,
    Mempool,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Spork,
        Category::Stake,
        Category::Checkpoint,
        Category::Net,
        Category::Reindex,
        Category::Mempool,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Spork => "spork",
            Category::Stake => "stake",
            Category::Checkpoint => "checkpoint",
            Category::Net => "net",
            Category::Reindex => "reindex",
            Category::Mempool => "mempool",
        }
    }

    /// Parses one `-debug=` value. `all` and `1` expand to every category.
    pub fn parse_list(raw: &str) -> Option<Vec<Category>> {
        let raw = raw.trim().to_ascii_lowercase();
        if raw == "all" || raw == "1" {
            return Some(Self::ALL.to_vec());
        }
        Self::ALL
            .iter()
            .copied()
            .find(|category| category.as_str() == raw)
            .map(|category| vec![category])
    }

    fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

static CATEGORY_MASK: AtomicU32 = AtomicU32::new(0);

pub fn enable_category(category: Category) {
    CATEGORY_MASK.fetch_or(category.bit(), Ordering::Relaxed);
}

pub fn reset_categories() {
    CATEGORY_MASK.store(0, Ordering::Relaxed);
}

pub fn category_enabled(category: Category) -> bool {
    CATEGORY_MASK.load(Ordering::Relaxed) & category.bit() != 0
}
