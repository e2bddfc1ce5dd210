pub mod op;
pub mod ops;

crate::command_enum! {
    #[cfg(feature = "fuse")]
    (Mount, ops::Mount),
    (Ls, ops::Ls),
    (Df, ops::Df),
}
