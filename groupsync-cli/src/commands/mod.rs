pub mod diff;
pub mod group;
pub mod job;
pub mod run;
pub mod schedule;
pub mod watchdog;
