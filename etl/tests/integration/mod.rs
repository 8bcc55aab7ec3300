mod merge_test;
mod progress_store_test;
mod queue_test;
