//! End-to-end tests of `hvs-client` against the stub HVS, see `tests/`.
