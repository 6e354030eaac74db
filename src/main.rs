fn main() {
    stacktest::cli::run();
}
