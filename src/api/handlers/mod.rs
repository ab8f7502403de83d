pub mod activities;
pub mod bellringers;
pub mod calendar;
pub mod classes;
pub mod lesson_plans;
pub mod media;
pub mod settings;
pub mod standards;
pub mod subdash;
pub mod tasks;
