//! End-to-end scenarios driving a real catalog over a temporary repositories folder.

mod harness;
mod scenarios;
