fn main() -> anyhow::Result<()> {
    dd_finder::cli_main::main()
}
