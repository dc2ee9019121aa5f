// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod fixture;
pub mod forms;
pub mod ids;
pub mod model;
pub mod selector;
pub mod state;
pub mod table;

pub use forms::*;
pub use ids::*;
pub use model::*;
pub use selector::*;
pub use state::*;
pub use table::*;
