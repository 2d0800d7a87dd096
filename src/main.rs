fn main() {
    geocheck_lib::run()
}
