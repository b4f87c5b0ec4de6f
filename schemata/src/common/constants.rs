/// Topic under which every schemata event bus publishes.
pub const SCHEMATA_EVENT: &str = "schemata_event";

/// Version reported by the engine for a store that does not exist yet.
pub const INITIAL_STORE_VERSION: u32 = 0;

/// First key handed out by an auto-increment key generator.
pub const FIRST_GENERATED_KEY: u64 = 1;

/// Separator between segments of a nested key path, e.g. `"owner.id"`.
pub const KEY_PATH_SEPARATOR: char = '.';
