macro_rules! hostcalls {
    ($(pub fn $name:ident($($arg:ident: $ty:ty,)*) -> Errno;)*) => ($(
        pub fn $name($($arg: $ty,)*) -> Errno {
            let ret = match crate::hostcalls_impl::$name($($arg,)*) {
                Ok(()) => Errno::Success,
                Err(e) => {
                    let errno = e.as_wasi_errno();
                    tracing::debug!("{}() = {}", stringify!($name), errno);
                    errno
                }
            };
            ret
        }
    )*)
}
