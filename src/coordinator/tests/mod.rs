//! BatchCoordinator tests, grouped by concern.

mod queue_unit;
