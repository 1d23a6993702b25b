//! Assets embedded at compile time: the default template and the workflow guide.

macro_rules! embedded_assets {
    ($($path:expr => $const_name:ident),* $(,)?) => {
        $(
            pub const $const_name: &str = include_str!(concat!("../../assets/", $path));
        )*

        pub fn get_embedded_asset(path: &str) -> Option<&'static str> {
            match path {
                $( $path => Some($const_name), )*
                _ => None,
            }
        }

        pub fn list_assets() -> Vec<&'static str> {
            vec![ $( $path, )* ]
        }
    };
}

embedded_assets! {
    "default_template.json" => DEFAULT_TEMPLATE_JSON,
    "GUIDE.md" => GUIDE_MD,
}
