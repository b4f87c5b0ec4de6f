mod engine_test;
mod event_test;
