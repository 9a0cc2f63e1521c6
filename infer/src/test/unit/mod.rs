mod broadcast;
mod engine;
mod matmul;
