//! End-to-end tests of the querydeck binary.
