fn main() {
    pty_host::run();
}
