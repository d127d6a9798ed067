pub mod linear_grid;
