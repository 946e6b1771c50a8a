//! Subcontracting along Shape -> Rectangle -> Square
//!
//! `resize` is declared on every level, each accepting a wider range of
//! sides than its base. A call on a square is accepted when any level's
//! precondition accepts it, and must then satisfy every level's
//! postcondition.

use std::sync::Arc;

use anyhow::Result;
use subcontract::{
    handler::FailureHandlers, ContractConfig, ContractError, ContractRuntime, ContractSpec,
    Invariant, OldValue, OverrideBinding,
};
use tracing::info;

struct Shape {
    name: &'static str,
}

struct Rectangle {
    shape: Shape,
    width: u32,
    height: u32,
}

struct Square {
    rect: Rectangle,
}

impl Invariant for Shape {
    type Base = ();

    fn class_name() -> &'static str {
        "Shape"
    }

    fn invariant(&self) -> bool {
        !self.name.is_empty()
    }
}

impl Invariant for Rectangle {
    type Base = Shape;

    fn class_name() -> &'static str {
        "Rectangle"
    }

    fn invariant(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    fn base(&self) -> Option<&Shape> {
        Some(&self.shape)
    }
}

impl Invariant for Square {
    type Base = Rectangle;

    fn class_name() -> &'static str {
        "Square"
    }

    fn invariant(&self) -> bool {
        self.rect.width == self.rect.height
    }

    fn base(&self) -> Option<&Rectangle> {
        Some(&self.rect)
    }
}

fn shape_of(square: &Square) -> &Shape {
    &square.rect.shape
}

fn rect_of(square: &Square) -> &Rectangle {
    &square.rect
}

fn area(r: &Rectangle) -> u64 {
    u64::from(r.width) * u64::from(r.height)
}

fn resize_binding(runtime: &ContractRuntime) -> Result<Arc<OverrideBinding<Square, u32, u64>>> {
    let binding = runtime.override_binding::<Square, u32, u64, _>("resize(u32)", |b| {
        b.inherit(
            "Shape",
            shape_of,
            ContractSpec::public_function("Shape::resize")
                .precondition(|_: &Shape, side: &u32| (1..=10).contains(side))
                .postcondition(|_: &Shape, _: &u32, _: &OldValue<()>, area: &u64| *area > 0),
        )
        .inherit(
            "Rectangle",
            rect_of,
            ContractSpec::public_function("Rectangle::resize")
                .precondition(|_: &Rectangle, side: &u32| (1..=100).contains(side))
                .old(|r: &Rectangle, _: &u32| area(r))
                .postcondition(|r: &Rectangle, _: &u32, old: &OldValue<u64>, a: &u64| {
                    old.holds(|_| *a == area(r))
                }),
        )
        .declare(
            "Square",
            ContractSpec::public_function("Square::resize")
                .precondition(|_: &Square, side: &u32| (1..=1_000).contains(side))
                .postcondition(|sq: &Square, side: &u32, _: &OldValue<()>, _: &u64| {
                    sq.rect.width == *side
                }),
        )
    })?;
    Ok(binding)
}

fn resize(square: &mut Square, side: &mut u32) -> Result<u64, ContractError> {
    square.rect.width = *side;
    square.rect.height = *side;
    Ok(area(&square.rect))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let runtime =
        ContractRuntime::with_handlers(ContractConfig::default(), FailureHandlers::propagating());
    let binding = resize_binding(&runtime)?;
    info!(classes = ?binding.classes(), "override chain");

    let mut square = Square {
        rect: Rectangle { shape: Shape { name: "square" }, width: 2, height: 2 },
    };

    // Rectangle accepts, Shape does not
    info!(area = binding.call(&runtime, &mut square, 50, resize)?, "resized");

    // Only Square accepts; its weaker precondition is enough
    info!(area = binding.call(&runtime, &mut square, 500, resize)?, "resized");

    // Nobody accepts
    if let Err(err) = binding.call(&runtime, &mut square, 5_000, resize) {
        info!("rejected: {err}");
    }

    // Satisfies Square's postcondition but breaks the area promises of its
    // bases
    let lying = binding.call(&runtime, &mut square, 3, |sq, side| {
        resize(sq, side)?;
        Ok::<_, ContractError>(0)
    });
    if let Err(err) = lying {
        info!("rejected: {err}");
    }

    println!("{}", serde_json::to_string_pretty(&runtime.stats())?);
    Ok(())
}
