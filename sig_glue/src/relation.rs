use serde::{Deserialize, Serialize};

use crate::Segment;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// The time ranges intersect, including the single-instant case where one
    /// segment ends exactly where the other begins.
    Overlap,
    /// The earlier segment ends strictly before the later one begins.
    Gap,
}

/// Whether the canonical (left, right) pair is the inputs as given or swapped.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InputOrder {
    AsGiven,
    Swapped,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Classification {
    pub relation: Relation,
    pub order: InputOrder,
    pub left_start: f64,
    pub left_end: f64,
    pub right_start: f64,
    pub right_end: f64,
}

impl Classification {
    pub fn is_overlap(&self) -> bool {
        self.relation == Relation::Overlap
    }

    /// The reconciled window: `[overlap_start, overlap_end]` for an overlap,
    /// `[gap_start, gap_end]` for a gap.
    pub fn window(&self) -> (f64, f64) {
        match self.relation {
            Relation::Overlap => (self.right_start, self.left_end.min(self.right_end)),
            Relation::Gap => (self.left_end, self.right_start),
        }
    }

    /// Put the two inputs into canonical (left, right) order.
    pub fn arrange<'a>(&self, a: &'a Segment, b: &'a Segment) -> (&'a Segment, &'a Segment) {
        match self.order {
            InputOrder::AsGiven => (a, b),
            InputOrder::Swapped => (b, a),
        }
    }
}

/// Label the temporal relation of two segments and fix their left/right order.
///
/// Left is the segment that starts first; on equal starts, the one whose last
/// sample comes first. The same ordering decides the relation, so assembly and
/// classification always agree on which side is earlier.
pub fn classify(a: &Segment, b: &Segment) -> Classification {
    let swap = b.start() < a.start() || (b.start() == a.start() && b.end() < a.end());
    let (left, right, order) = if swap {
        (b, a, InputOrder::Swapped)
    } else {
        (a, b, InputOrder::AsGiven)
    };

    let relation = if left.end() >= right.start() {
        Relation::Overlap
    } else {
        Relation::Gap
    };

    Classification {
        relation,
        order,
        left_start: left.start(),
        left_end: left.end(),
        right_start: right.start(),
        right_end: right.end(),
    }
}
