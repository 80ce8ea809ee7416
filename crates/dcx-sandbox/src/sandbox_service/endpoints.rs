pub const READ_ENDPOINT: &str = "/read";
pub const WRITE_ENDPOINT: &str = "/write";
pub const LIST_ENDPOINT: &str = "/list";
pub const DELETE_ENDPOINT: &str = "/delete";
pub const FS_MOVE_ENDPOINT: &str = "/fs/move";
pub const FS_MKDIR_ENDPOINT: &str = "/fs/mkdir";
pub const FS_STAT_ENDPOINT: &str = "/fs/stat";
pub const DISCOVER_TOOLS_ENDPOINT: &str = "/discover-tools";
