//! Integration tests

mod test_cache;
mod test_fsm;
mod test_sync;
