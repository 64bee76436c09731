mod forwarded_headers_extractor;

pub use forwarded_headers_extractor::*;
