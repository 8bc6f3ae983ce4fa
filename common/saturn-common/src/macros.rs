/// Define a two-variant enum backed by a single register bit.
#[macro_export]
macro_rules! define_bit_enum {
    ($name:ident, [$zero:ident, $one:ident]) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Default, ::bincode::Encode, ::bincode::Decode,
        )]
        pub enum $name {
            #[default]
            $zero = 0,
            $one = 1,
        }

        impl $name {
            #[must_use]
            pub fn from_bit(bit: bool) -> Self {
                if bit { Self::$one } else { Self::$zero }
            }

            #[must_use]
            pub fn to_bit(self) -> bool {
                self == Self::$one
            }
        }
    };
}
