// Matching layer and the batch jobs built on it
pub mod matching {
    pub use crate::aliases::*;
    pub use crate::matcher::*;
    pub use crate::normalize::*;
    pub use crate::similarity::*;
}

pub mod jobs {
    pub use crate::consolidation::*;
    pub use crate::correlation::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
