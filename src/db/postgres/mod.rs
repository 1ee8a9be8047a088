mod client;
mod ops;

pub use client::PostgresClient;
pub use ops::{
    delete_non_final_onchain_events, get_ledger, get_pool, get_position, get_position_by_identity,
    get_token, hard_reset_ledger, input_hash_exists, list_active_positions, next_manual_log_index,
    upsert_pool, upsert_position, upsert_position_event, upsert_token,
};
