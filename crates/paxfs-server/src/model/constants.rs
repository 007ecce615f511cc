//! Server configuration keys and defaults

pub const DEFAULT_CONFIG_FILE: &str = "conf/application.yml";
pub const DEFAULT_SERVER_PORT: u16 = 8765;
pub const DEFAULT_DATA_DIR: &str = "./data/paxfs";

pub const SERVER_ADDRESS_PROPERTY: &str = "server.address";
pub const SERVER_PORT_PROPERTY: &str = "server.port";

pub const REPLICA_COUNT_PROPERTY: &str = "paxfs.replica.count";
pub const INITIAL_LEADER_PROPERTY: &str = "paxfs.replica.initial_leader";
pub const DATA_DIR_PROPERTY: &str = "paxfs.data.dir";
/// `memory` or `rocksdb`
pub const STORAGE_MODE_PROPERTY: &str = "paxfs.storage";

pub const LOG_PATH_PROPERTY: &str = "paxfs.logs.path";
pub const LOG_LEVEL_PROPERTY: &str = "paxfs.logs.level";
pub const LOG_CONSOLE_PROPERTY: &str = "paxfs.logs.console";
pub const LOG_FILE_PROPERTY: &str = "paxfs.logs.file";
