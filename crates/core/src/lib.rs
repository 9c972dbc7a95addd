pub mod disease;
pub mod intent;
pub mod market;
pub mod models;

pub use disease::{assess, assess_colors};
pub use intent::{
    normalize_query, query_preview, IntentResponder, KeywordTable, ResponderTables, ResponseTable,
    TableError,
};
pub use models::*;
