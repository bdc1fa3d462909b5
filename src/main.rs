fn main() -> anyhow::Result<()> {
    flow_playground::showcase::run()
}
