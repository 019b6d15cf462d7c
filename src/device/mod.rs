pub mod action;
pub mod adb;
pub mod companion;
pub mod controller;
pub mod manager;
pub mod shell;
