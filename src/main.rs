fn main() -> Result<(), Box<dyn std::error::Error>> {
    promptpad::cli::main()
}
