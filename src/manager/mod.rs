pub mod task_controller;
