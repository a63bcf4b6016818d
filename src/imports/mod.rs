pub mod views;

#[cfg(test)]
mod tests;
