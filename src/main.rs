fn main() -> std::process::ExitCode {
    revenuelens_lib::run()
}
