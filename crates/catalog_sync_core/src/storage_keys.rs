pub const DEFAULT_KEY_PREFIX: &str = "catalog";
pub const DEFAULT_ARCHIVE_PREFIX: &str = "catalog";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyKind {
    LastSync,
    GenerationPointer,
    PendingGenerations,
}

impl KeyKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::LastSync => "last_sync",
            Self::GenerationPointer => "generation",
            Self::PendingGenerations => "pending",
        }
    }
}

fn namespace(prefix: &str) -> &str {
    let trimmed = prefix.trim_matches(':');
    if trimmed.is_empty() {
        DEFAULT_KEY_PREFIX
    } else {
        trimmed
    }
}

fn head_key(prefix: &str, kind: KeyKind) -> String {
    format!("{}:{}", namespace(prefix), kind.as_str())
}

pub fn last_sync_key(prefix: &str) -> String {
    head_key(prefix, KeyKind::LastSync)
}

pub fn generation_pointer_key(prefix: &str) -> String {
    head_key(prefix, KeyKind::GenerationPointer)
}

/// Sorted set of generations that started staging but have neither been
/// committed nor retired, scored by staging start in epoch milliseconds.
pub fn pending_generations_key(prefix: &str) -> String {
    head_key(prefix, KeyKind::PendingGenerations)
}

pub fn generation_prefix(prefix: &str, generation: &str) -> String {
    format!("{}:gen:{generation}", namespace(prefix))
}

/// Membership set of one generation. It doubles as the rebuild staging set
/// until the generation pointer is switched to it.
pub fn membership_key(prefix: &str, generation: &str) -> String {
    format!("{}:services", generation_prefix(prefix, generation))
}

pub fn record_key_prefix(prefix: &str, generation: &str) -> String {
    format!("{}:service:", generation_prefix(prefix, generation))
}

pub fn record_key(prefix: &str, generation: &str, id: &str) -> String {
    format!("{}{id}", record_key_prefix(prefix, generation))
}

pub fn archive_object_key(archive_prefix: &str, last_sync: &str) -> String {
    let trimmed = archive_prefix.trim_matches('/');
    if trimmed.is_empty() {
        format!("{last_sync}.csv")
    } else {
        format!("{trimmed}/{last_sync}.csv")
    }
}
