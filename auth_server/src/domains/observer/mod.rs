mod lifecycle;

pub use lifecycle::UserObserver;
