// Order aggregate
pub mod orders;

// Transition table and admin status updates
pub mod order_status;

// Payment proof submission and review
pub mod payment_proofs;

// Cart access used by checkout
pub mod commerce;
