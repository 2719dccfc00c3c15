fn main() -> anyhow::Result<()> {
    moodsense_lib::run()
}
