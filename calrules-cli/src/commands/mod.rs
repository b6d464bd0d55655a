pub mod check;
pub mod logs;
pub mod rules;
pub mod run;
pub mod stats;
pub mod watch;
