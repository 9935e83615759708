mod common;
mod install_tests;
mod paths_tests;
