pub mod formats;
pub mod normalize;
pub mod parser;
pub mod resolver;
pub mod search;
pub mod throttle;
