//! Integration tests for `netinf-core` live under `tests/`.
