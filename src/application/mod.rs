pub mod annotate;
pub mod dto;
pub mod emitter;
pub mod ports;
pub mod producer;
pub mod relay;
pub mod services;
