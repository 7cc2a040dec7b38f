// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Kerf Contributors.

//! Collision detection
//!
//! Broad phase ([`bvh`]) prunes component pairs with refit axis-aligned
//! boxes; narrow phase ([`gjk`]) resolves the survivors through support
//! functions. [`pipeline`] drives both per move, with CCD sampling for
//! rapids and near-miss advisories.

pub mod bbox;
pub mod bvh;
pub mod gjk;
pub mod pipeline;
pub mod shape;

pub use bbox::Aabb;
pub use bvh::Bvh;
pub use gjk::Contact;
pub use pipeline::{
    CollisionConfig, CollisionEvent, CollisionKind, CollisionPipeline, Severity,
};
pub use shape::{Collider, Shape};
