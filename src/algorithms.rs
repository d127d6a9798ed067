pub mod basis_evaluation;
pub mod evaluation_transposed;
pub mod multiple_evaluation;
