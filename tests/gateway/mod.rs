mod dispatch_test;
mod watch_sync_test;
