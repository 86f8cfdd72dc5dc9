pub mod embedding_worker;
pub mod lease_reclaimer;

pub use embedding_worker::embedding_worker;
pub use lease_reclaimer::lease_reclaimer;
