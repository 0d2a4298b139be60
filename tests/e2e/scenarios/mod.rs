mod catalog_lifecycle;
mod fork_networks;
mod gc_exclusion;
mod mirroring;
mod permissions;
mod restarts;
