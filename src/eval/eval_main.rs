fn main() {
    std::process::exit(eval_batch::eval::main());
}
