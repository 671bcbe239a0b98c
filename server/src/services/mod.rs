pub mod marker_feed_loader;
