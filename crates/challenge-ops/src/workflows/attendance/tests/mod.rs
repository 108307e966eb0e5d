mod common;
mod weekly;
