// Ensures every compiled-in module crate is linked so its `register_module!`
// submissions reach the `inventory` collection. Maintained by hand; a
// build.rs that scans ./modules could generate this later.
#![allow(unused_imports)]

use store_sqlite as _;
