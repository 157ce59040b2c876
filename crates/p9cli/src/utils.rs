use {
    nix::sys::stat::SFlag,
    rs9p_client::{RemoteFile, Result},
};

/// Split a slash separated path into walk elements.
pub fn path_elements(path: &str) -> Vec<&str> {
    path.split('/')
        .filter(|name| !name.is_empty() && *name != ".")
        .collect()
}

pub async fn lookup(root: &RemoteFile, path: &str) -> Result<RemoteFile> {
    root.walk_path(&path_elements(path)).await
}

/// Render a mode the way `ls -l` does.
pub fn format_mode(mode: u32) -> String {
    let file_type = match mode & SFlag::S_IFMT.bits() as u32 {
        t if t == SFlag::S_IFDIR.bits() as u32 => 'd',
        t if t == SFlag::S_IFLNK.bits() as u32 => 'l',
        t if t == SFlag::S_IFCHR.bits() as u32 => 'c',
        t if t == SFlag::S_IFBLK.bits() as u32 => 'b',
        t if t == SFlag::S_IFIFO.bits() as u32 => 'p',
        t if t == SFlag::S_IFSOCK.bits() as u32 => 's',
        _ => '-',
    };

    let mut out = String::with_capacity(10);
    out.push(file_type);
    for shift in [6, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elements_of_paths() {
        assert_eq!(path_elements("/usr/glenda/lib"), vec!["usr", "glenda", "lib"]);
        assert_eq!(path_elements("./a//b/"), vec!["a", "b"]);
        assert!(path_elements("/").is_empty());
        assert_eq!(path_elements("../x"), vec!["..", "x"]);
    }

    #[test]
    fn modes() {
        assert_eq!(format_mode(0o40755), "drwxr-xr-x");
        assert_eq!(format_mode(0o100640), "-rw-r-----");
        assert_eq!(format_mode(0o120777), "lrwxrwxrwx");
    }
}
