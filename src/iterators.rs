pub mod grid_iterator;
