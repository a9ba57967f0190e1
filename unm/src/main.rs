fn main() {
    unm::main();
}
