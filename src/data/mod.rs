// Data access layer
pub mod db {
    pub use crate::db::*;
}

pub mod storage {
    pub use crate::db_storage::*;
    pub use crate::memory_store::*;
}

pub mod repository {
    pub use crate::repository::*;
}
